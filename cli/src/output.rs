//! Output formatting utilities for CLI commands

use colored::Colorize;

use crate::collector::Invocation;

/// Print success message
pub fn success(msg: &str) {
    eprintln!("{} {}", "✓".green(), msg);
}

/// Print error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print info message
pub fn info(msg: &str) {
    eprintln!("{} {}", "ℹ".blue(), msg);
}

/// Print warning message
pub fn warning(msg: &str) {
    eprintln!("{} {}", "⚠".yellow(), msg);
}

/// Render one intercepted call for the terminal
pub fn render_invocation(invocation: &Invocation, color: bool) -> String {
    let header = format!("[{}] {}", invocation.timestamp, invocation.symbol);
    let header = if color {
        header.bold().cyan().to_string()
    } else {
        header
    };

    format!(
        "{}\nConnection: {}\nMessage: {}\n",
        header, invocation.connection_description, invocation.message_description
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_plain() {
        let invocation = Invocation {
            timestamp: 12,
            symbol: "xpc_connection_send_message".to_string(),
            connection_description: "<conn>".to_string(),
            message_description: "<msg>".to_string(),
        };

        assert_eq!(
            render_invocation(&invocation, false),
            "[12] xpc_connection_send_message\nConnection: <conn>\nMessage: <msg>\n"
        );
    }
}
