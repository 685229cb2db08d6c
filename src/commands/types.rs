//! Types command implementation.
//!
//! Lists the process type classification rules in effect.

use herakles_proc_monitor::source::types::TYPE_RULES;
use herakles_proc_monitor::ProcessType;

/// Lists process type rules
pub fn command_types(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("📋 Process type rules (first match wins)");
    println!("========================================");

    if TYPE_RULES.is_empty() {
        println!("\n⚠️  No rules loaded; every process is typed by its name");
        return Ok(());
    }

    for (i, rule) in TYPE_RULES.rules().iter().enumerate() {
        let rank = ProcessType::from(rule.process_type.as_str()).display_rank();
        println!("\n{:>3}. {} (group {})", i + 1, rule.process_type, rank);
        if verbose {
            if !rule.names.is_empty() {
                println!("     names: {}", rule.names.join(", "));
            }
            if !rule.args.is_empty() {
                println!("     args:  {}", rule.args.join(" | "));
            }
        }
    }

    println!("\n💡 Unmatched processes are typed by their process name.");
    Ok(())
}
