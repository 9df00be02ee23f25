//! Group membership ACL.

use serde::{Deserialize, Serialize};

use super::AclAdapter;
#[cfg(unix)]
use crate::config::AdapterConfig;
use crate::error::ClusterResult;

/// Whether the listed groups grant or deny access.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    /// Allow only members of at least one listed group.
    #[default]
    Whitelist,
    /// Deny members of any listed group.
    Blacklist,
}

/// Options of the `group` ACL adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupAclConfig {
    /// Group names to check.
    pub groups: Vec<String>,
    /// Whitelist or blacklist semantics.
    #[serde(default, rename = "type")]
    pub kind: ListKind,
}

/// ACL granting access based on the current user's group membership.
#[derive(Debug, Clone)]
pub struct GroupAcl {
    config: GroupAclConfig,
    user_groups: Vec<String>,
}

impl GroupAcl {
    /// Create an ACL evaluated against an explicit set of user groups.
    pub fn new(config: GroupAclConfig, user_groups: Vec<String>) -> Self {
        Self {
            config,
            user_groups,
        }
    }

    /// Build the ACL for the current process user.
    #[cfg(unix)]
    pub fn from_config(config: &AdapterConfig) -> ClusterResult<Self> {
        let config: GroupAclConfig = config.decode()?;
        let user_groups = current_groups()?;
        Ok(Self::new(config, user_groups))
    }

    /// The configured groups.
    pub fn groups(&self) -> &[String] {
        &self.config.groups
    }

    /// Whitelist or blacklist semantics.
    pub fn kind(&self) -> ListKind {
        self.config.kind
    }

    fn member_of_any(&self) -> bool {
        self.config
            .groups
            .iter()
            .any(|group| self.user_groups.contains(group))
    }
}

impl AclAdapter for GroupAcl {
    fn allow(&self) -> bool {
        match self.config.kind {
            ListKind::Whitelist => self.member_of_any(),
            ListKind::Blacklist => !self.member_of_any(),
        }
    }
}

/// Names of all groups of the current process (supplementary plus effective).
#[cfg(unix)]
pub fn current_groups() -> ClusterResult<Vec<String>> {
    // SAFETY: a zero-sized query only returns the number of groups.
    let count = unsafe { libc::getgroups(0, std::ptr::null_mut()) };
    if count < 0 {
        return Err(std::io::Error::last_os_error().into());
    }

    let mut gids: Vec<libc::gid_t> = vec![0; count as usize];
    // SAFETY: `gids` has room for exactly `count` entries.
    let written = unsafe { libc::getgroups(count, gids.as_mut_ptr()) };
    if written < 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    gids.truncate(written as usize);

    // SAFETY: getegid cannot fail.
    let egid = unsafe { libc::getegid() };
    if !gids.contains(&egid) {
        gids.push(egid);
    }

    Ok(gids.into_iter().filter_map(group_name).collect())
}

#[cfg(unix)]
fn group_name(gid: libc::gid_t) -> Option<String> {
    let mut buf: Vec<libc::c_char> = vec![0; 1024];
    loop {
        // SAFETY: `group` is plain data filled in by getgrgid_r.
        let mut group: libc::group = unsafe { std::mem::zeroed() };
        let mut result: *mut libc::group = std::ptr::null_mut();
        // SAFETY: all pointers are valid for the duration of the call and
        // `buf.len()` is the true size of the scratch buffer.
        let rc = unsafe {
            libc::getgrgid_r(gid, &mut group, buf.as_mut_ptr(), buf.len(), &mut result)
        };

        if rc == libc::ERANGE && buf.len() < (1 << 20) {
            buf.resize(buf.len() * 2, 0);
            continue;
        }
        if rc != 0 || result.is_null() || group.gr_name.is_null() {
            return None;
        }

        // SAFETY: gr_name points into `buf` and is NUL-terminated.
        let name = unsafe { std::ffi::CStr::from_ptr(group.gr_name) };
        return Some(name.to_string_lossy().into_owned());
    }
}
