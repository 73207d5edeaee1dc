pub mod primary;
pub mod subnet;

use std::io::{self, stdout};

use clap::Command;
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use devnet_ops::validator::RegistrationReport;

pub const NAME: &str = "validate";

pub fn command() -> Command {
    Command::new(NAME)
        .about("Registers cluster nodes as validators")
        .subcommands(vec![primary::command(), subnet::command()])
        .subcommand_required(true)
        .arg_required_else_help(true)
}

/// Prints a batch outcome, failures last and in red.
pub fn print_report(report: &RegistrationReport) -> io::Result<()> {
    for (host_id, tx_ids) in report.added.iter() {
        println!("{host_id}: added ({})", tx_ids.join(", "));
    }
    for (host_id, reason) in report.skipped.iter() {
        println!("{host_id}: skipped ({reason})");
    }
    for (host_id, reason) in report.failed.iter() {
        execute!(
            stdout(),
            SetForegroundColor(Color::Red),
            Print(format!("{host_id}: failed ({reason})\n")),
            ResetColor
        )?;
    }
    Ok(())
}
