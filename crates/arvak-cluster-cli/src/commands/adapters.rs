//! Adapters command implementation.

use console::style;

use arvak_cluster::{AclFactory, AdapterRegistry, JobFactory};

fn print_registry<A: ?Sized>(registry: &AdapterRegistry<A>) {
    println!("  {}:", style(registry.kind()).bold());
    for name in registry.available_adapters() {
        println!("    {} {}", style("●").green(), name);
    }
    for (name, reason) in registry.unavailable_adapters() {
        println!(
            "    {} {} ({})",
            style("○").dim(),
            style(name).dim(),
            reason
        );
    }
}

/// Execute the adapters command.
pub fn execute() {
    println!("{} Built-in adapters:\n", style("Arvak").cyan().bold());
    print_registry(&AclFactory::with_builtins());
    print_registry(&JobFactory::with_builtins());
}
