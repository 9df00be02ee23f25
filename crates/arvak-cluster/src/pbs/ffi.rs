//! `libtorque` bindings loaded at runtime.
//!
//! The library path is a property of each [`LibTorque`] value (and through it
//! of each [`Batch`](super::Batch)); there is no process-wide library state.
//! Loading happens on first use and its outcome is remembered.
//!
//! This module requires `--features native-torque`.

use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::OnceLock;

use libloading::Library;
use tracing::{debug, warn};

use super::native::{
    Attribute, ConnectionId, HoldType, PBSE_NONE, StatScope, StatusAttributes, StatusMap,
    TorqueApi, insert_attribute,
};
use crate::error::{ClusterError, ClusterResult};

/// `struct attrl` / `struct attropl` (identical layout).
#[repr(C)]
struct Attrl {
    next: *mut Attrl,
    name: *mut c_char,
    resource: *mut c_char,
    value: *mut c_char,
    op: c_int,
}

/// `struct batch_status`.
#[repr(C)]
struct BatchStatus {
    next: *mut BatchStatus,
    name: *mut c_char,
    attribs: *mut Attrl,
    text: *mut c_char,
}

/// `enum batch_op` value `SET`.
const BATCH_OP_SET: c_int = 0;

type ConnectFn = unsafe extern "C" fn(*mut c_char) -> c_int;
type DisconnectFn = unsafe extern "C" fn(c_int) -> c_int;
type StatServerFn = unsafe extern "C" fn(c_int, *mut Attrl, *mut c_char) -> *mut BatchStatus;
type StatFn = unsafe extern "C" fn(c_int, *mut c_char, *mut Attrl, *mut c_char) -> *mut BatchStatus;
type StatFreeFn = unsafe extern "C" fn(*mut BatchStatus);
type SubmitFn =
    unsafe extern "C" fn(c_int, *mut Attrl, *mut c_char, *mut c_char, *mut c_char) -> *mut c_char;
type HoldFn = unsafe extern "C" fn(c_int, *mut c_char, *mut c_char, *mut c_char) -> c_int;
type DeleteFn = unsafe extern "C" fn(c_int, *mut c_char, *mut c_char) -> c_int;
type StrErrorFn = unsafe extern "C" fn(c_int) -> *mut c_char;

struct Symbols {
    connect: ConnectFn,
    disconnect: DisconnectFn,
    statserver: StatServerFn,
    statque: StatFn,
    statnode: StatFn,
    statjob: StatFn,
    statfree: StatFreeFn,
    submit: SubmitFn,
    holdjob: HoldFn,
    rlsjob: HoldFn,
    deljob: DeleteFn,
    strerror: StrErrorFn,
    errno: *mut c_int,
}

// SAFETY: the function pointers are plain code addresses. `errno` points at
// the library's `pbs_errno` global, which stays valid for as long as the
// owning `Library` is loaded; it is only ever read.
unsafe impl Send for Symbols {}
unsafe impl Sync for Symbols {}

struct Loaded {
    symbols: Symbols,
    _library: Library,
}

impl Loaded {
    /// # Safety
    ///
    /// `path` must be a Torque client library exporting the standard
    /// `pbs_*` C API.
    unsafe fn open(path: &Path) -> Result<Self, String> {
        // SAFETY: forwarded to the caller.
        let library = unsafe { Library::new(path) }
            .map_err(|e| format!("failed to load '{}': {e}", path.display()))?;

        // SAFETY: every symbol type matches the Torque C declarations.
        let symbols = unsafe {
            Symbols {
                connect: symbol(&library, path, b"pbs_connect\0")?,
                disconnect: symbol(&library, path, b"pbs_disconnect\0")?,
                statserver: symbol(&library, path, b"pbs_statserver\0")?,
                statque: symbol(&library, path, b"pbs_statque\0")?,
                statnode: symbol(&library, path, b"pbs_statnode\0")?,
                statjob: symbol(&library, path, b"pbs_statjob\0")?,
                statfree: symbol(&library, path, b"pbs_statfree\0")?,
                submit: symbol(&library, path, b"pbs_submit\0")?,
                holdjob: symbol(&library, path, b"pbs_holdjob\0")?,
                rlsjob: symbol(&library, path, b"pbs_rlsjob\0")?,
                deljob: symbol(&library, path, b"pbs_deljob\0")?,
                strerror: symbol(&library, path, b"pbs_strerror\0")?,
                errno: symbol(&library, path, b"pbs_errno\0")?,
            }
        };

        Ok(Self {
            symbols,
            _library: library,
        })
    }
}

/// # Safety
///
/// `T` must match the type of the exported symbol.
unsafe fn symbol<T: Copy>(library: &Library, path: &Path, name: &[u8]) -> Result<T, String> {
    // SAFETY: forwarded to the caller.
    let symbol = unsafe { library.get::<T>(name) }.map_err(|e| {
        format!(
            "'{}' is missing {}: {e}",
            path.display(),
            String::from_utf8_lossy(&name[..name.len().saturating_sub(1)])
        )
    })?;
    Ok(*symbol)
}

/// Torque client library loaded from a shared object.
pub struct LibTorque {
    path: PathBuf,
    loaded: OnceLock<Result<Loaded, String>>,
}

impl LibTorque {
    /// File name of the client library inside a Torque `lib` directory.
    pub const LIBRARY_NAME: &'static str = "libtorque.so";

    /// Bind to the client library inside a Torque `lib` directory.
    pub fn new(lib_dir: &Path) -> Self {
        Self::from_path(lib_dir.join(Self::LIBRARY_NAME))
    }

    /// Bind to a client library at an explicit path.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            loaded: OnceLock::new(),
        }
    }

    /// Path of the shared object.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn symbols(&self) -> ClusterResult<&Symbols> {
        let loaded = self.loaded.get_or_init(|| {
            debug!("Loading Torque client library from {}", self.path.display());
            // SAFETY: the configured path names the site's Torque client
            // library; loading an arbitrary library is the operator's call.
            let loaded = unsafe { Loaded::open(&self.path) };
            if let Err(e) = &loaded {
                warn!("{e}");
            }
            loaded
        });

        loaded
            .as_ref()
            .map(|l| &l.symbols)
            .map_err(|reason| ClusterError::AdapterLoadFailure {
                adapter: "torque".to_string(),
                reason: reason.clone(),
            })
    }
}

impl std::fmt::Debug for LibTorque {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibTorque")
            .field("path", &self.path)
            .field("loaded", &matches!(self.loaded.get(), Some(Ok(_))))
            .finish()
    }
}

fn c_string(value: &str) -> ClusterResult<CString> {
    CString::new(value)
        .map_err(|_| ClusterError::Config(format!("value contains a NUL byte: {value:?}")))
}

/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string.
unsafe fn lossy(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        // SAFETY: forwarded to the caller.
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    }
}

/// A native attribute list whose strings live as long as the list.
struct AttrList {
    _strings: Vec<CString>,
    nodes: Box<[Attrl]>,
}

impl AttrList {
    fn names(names: &[String]) -> ClusterResult<Self> {
        let entries: Vec<Attribute> = names
            .iter()
            .map(|name| Attribute::new(name.as_str(), ""))
            .collect();
        Self::build(&entries, false)
    }

    fn attributes(attributes: &[Attribute]) -> ClusterResult<Self> {
        Self::build(attributes, true)
    }

    fn build(entries: &[Attribute], with_values: bool) -> ClusterResult<Self> {
        let mut strings = Vec::new();
        let mut nodes = Vec::with_capacity(entries.len());

        for entry in entries {
            let name = c_string(&entry.name)?;
            let name_ptr = name.as_ptr() as *mut c_char;
            strings.push(name);

            let resource_ptr = match &entry.resource {
                Some(resource) => {
                    let resource = c_string(resource)?;
                    let p = resource.as_ptr() as *mut c_char;
                    strings.push(resource);
                    p
                }
                None => ptr::null_mut(),
            };

            let value_ptr = if with_values {
                let value = c_string(&entry.value)?;
                let p = value.as_ptr() as *mut c_char;
                strings.push(value);
                p
            } else {
                ptr::null_mut()
            };

            nodes.push(Attrl {
                next: ptr::null_mut(),
                name: name_ptr,
                resource: resource_ptr,
                value: value_ptr,
                op: BATCH_OP_SET,
            });
        }

        let mut nodes = nodes.into_boxed_slice();
        let base = nodes.as_mut_ptr();
        for i in 1..nodes.len() {
            // SAFETY: both indices are in bounds of the boxed slice, which is
            // never resized afterwards.
            unsafe { (*base.add(i - 1)).next = base.add(i) };
        }

        Ok(Self {
            _strings: strings,
            nodes,
        })
    }

    fn as_mut_ptr(&mut self) -> *mut Attrl {
        if self.nodes.is_empty() {
            ptr::null_mut()
        } else {
            self.nodes.as_mut_ptr()
        }
    }
}

/// # Safety
///
/// `status` must be null or the head of a `batch_status` list returned by
/// the library and not yet freed.
unsafe fn status_to_map(mut status: *mut BatchStatus) -> StatusMap {
    let mut map = StatusMap::new();
    while !status.is_null() {
        // SAFETY: non-null list nodes are valid per the caller contract.
        let entry = unsafe { &*status };
        let mut attributes = StatusAttributes::new();

        let mut attr = entry.attribs;
        while !attr.is_null() {
            // SAFETY: as above, for the nested attribute list.
            let a = unsafe { &*attr };
            let resource = if a.resource.is_null() {
                None
            } else {
                // SAFETY: non-null strings from the library are terminated.
                Some(unsafe { lossy(a.resource) })
            };
            // SAFETY: as above.
            let (name, value) = unsafe { (lossy(a.name), lossy(a.value)) };
            insert_attribute(&mut attributes, &name, resource.as_deref(), &value);
            attr = a.next;
        }

        // SAFETY: as above.
        map.insert(unsafe { lossy(entry.name) }, attributes);
        status = entry.next;
    }
    map
}

impl TorqueApi for LibTorque {
    fn connect(&self, host: &str) -> ClusterResult<ConnectionId> {
        let sym = self.symbols()?;
        let host = c_string(host)?;
        // SAFETY: `host` outlives the call.
        Ok(unsafe { (sym.connect)(host.as_ptr() as *mut c_char) })
    }

    fn disconnect(&self, cid: ConnectionId) -> ClusterResult<()> {
        let sym = self.symbols()?;
        // SAFETY: plain integer argument.
        unsafe { (sym.disconnect)(cid) };
        Ok(())
    }

    fn stat(
        &self,
        cid: ConnectionId,
        scope: StatScope,
        id: &str,
        filters: &[String],
    ) -> ClusterResult<StatusMap> {
        let sym = self.symbols()?;
        let mut filters = AttrList::names(filters)?;
        let id = c_string(id)?;
        let id_ptr = id.as_ptr() as *mut c_char;

        // SAFETY: all pointers outlive the call; the library does not retain
        // them.
        let status = unsafe {
            match scope {
                StatScope::Server => (sym.statserver)(cid, filters.as_mut_ptr(), ptr::null_mut()),
                StatScope::Queue => (sym.statque)(cid, id_ptr, filters.as_mut_ptr(), ptr::null_mut()),
                StatScope::Node => (sym.statnode)(cid, id_ptr, filters.as_mut_ptr(), ptr::null_mut()),
                StatScope::Job => (sym.statjob)(cid, id_ptr, filters.as_mut_ptr(), ptr::null_mut()),
            }
        };

        // SAFETY: `status` came straight from the library.
        let map = unsafe { status_to_map(status) };
        if !status.is_null() {
            // SAFETY: freed exactly once, after the last read.
            unsafe { (sym.statfree)(status) };
        }
        Ok(map)
    }

    fn submit(
        &self,
        cid: ConnectionId,
        attributes: &[Attribute],
        script: &str,
        queue: &str,
    ) -> ClusterResult<Option<String>> {
        let sym = self.symbols()?;
        let mut attributes = AttrList::attributes(attributes)?;
        let script = c_string(script)?;
        let queue = c_string(queue)?;

        // SAFETY: all pointers outlive the call.
        let job_id = unsafe {
            (sym.submit)(
                cid,
                attributes.as_mut_ptr(),
                script.as_ptr() as *mut c_char,
                queue.as_ptr() as *mut c_char,
                ptr::null_mut(),
            )
        };

        if job_id.is_null() {
            return Ok(None);
        }
        // SAFETY: the returned id is a malloc'd, NUL-terminated string owned
        // by the caller.
        let id = unsafe { lossy(job_id) };
        unsafe { libc::free(job_id as *mut c_void) };
        Ok(Some(id))
    }

    fn hold(&self, cid: ConnectionId, id: &str, hold: HoldType) -> ClusterResult<()> {
        let sym = self.symbols()?;
        let id = c_string(id)?;
        let hold = c_string(hold.as_str())?;
        // SAFETY: all pointers outlive the call.
        unsafe {
            (sym.holdjob)(
                cid,
                id.as_ptr() as *mut c_char,
                hold.as_ptr() as *mut c_char,
                ptr::null_mut(),
            )
        };
        Ok(())
    }

    fn release(&self, cid: ConnectionId, id: &str, hold: HoldType) -> ClusterResult<()> {
        let sym = self.symbols()?;
        let id = c_string(id)?;
        let hold = c_string(hold.as_str())?;
        // SAFETY: all pointers outlive the call.
        unsafe {
            (sym.rlsjob)(
                cid,
                id.as_ptr() as *mut c_char,
                hold.as_ptr() as *mut c_char,
                ptr::null_mut(),
            )
        };
        Ok(())
    }

    fn delete(&self, cid: ConnectionId, id: &str) -> ClusterResult<()> {
        let sym = self.symbols()?;
        let id = c_string(id)?;
        // SAFETY: all pointers outlive the call.
        unsafe { (sym.deljob)(cid, id.as_ptr() as *mut c_char, ptr::null_mut()) };
        Ok(())
    }

    fn errno(&self) -> i32 {
        match self.loaded.get() {
            // SAFETY: see `Symbols`.
            Some(Ok(loaded)) => unsafe { *loaded.symbols.errno },
            _ => PBSE_NONE,
        }
    }

    fn strerror(&self, code: i32) -> String {
        let Ok(sym) = self.symbols() else {
            return format!("error {code}");
        };
        // SAFETY: the library returns a static string or null.
        let message = unsafe { lossy((sym.strerror)(code)) };
        if message.is_empty() {
            format!("error {code}")
        } else {
            message
        }
    }
}
