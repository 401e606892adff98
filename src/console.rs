/// The console output module.
use crossterm::{
    style::{self, Stylize},
    ExecutableCommand,
};
use std::io::{self, Write};

pub fn echo(s: String) {
    let mut out = io::stdout();
    if out.execute(style::Print(s)).is_err() {
        return;
    }
    let _ = out.flush();
}

pub fn error(s: String) {
    let mut err = io::stderr();
    if err.execute(style::PrintStyledContent(s.red())).is_err() {
        return;
    }
    let _ = err.flush();
}

pub fn echo_lines(s: String) {
    let mut out = io::stdout();
    for l in s.lines() {
        if out.execute(style::Print(format!("{}\n", l))).is_err() {
            continue;
        }
    }
    let _ = out.flush();
}

/// Renders `rows` under `headers` as a boxed text table.
pub fn echo_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut result = String::new();

    let num_columns = headers.len();
    let mut column_widths = vec![0; num_columns];
    for (i, header) in headers.iter().enumerate() {
        column_widths[i] = header.len();
    }
    for row in rows {
        for (i, col) in row.iter().enumerate().take(num_columns) {
            column_widths[i] = column_widths[i].max(col.len());
        }
    }

    let border = |result: &mut String| {
        result.push('+');
        for width in &column_widths {
            result.push_str(&"-".repeat(*width));
            result.push('+');
        }
        result.push('\n');
    };

    border(&mut result);
    if !headers.is_empty() {
        result.push('|');
        for (i, header) in headers.iter().enumerate() {
            result.push_str(&format!("{:<width$}|", header, width = column_widths[i]));
        }
        result.push('\n');
        border(&mut result);
    }
    for row in rows {
        result.push('|');
        for (i, col) in row.iter().enumerate().take(num_columns) {
            result.push_str(&format!("{:<width$}|", col, width = column_widths[i]));
        }
        result.push('\n');
    }
    border(&mut result);

    result
}

/// Printable form of a key or value: UTF-8 text as is, anything else as hex.
pub fn display_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) if s.chars().all(|c| !c.is_control()) => s.to_string(),
        _ => {
            let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
            format!("0x{}", hex)
        }
    }
}

#[macro_export]
macro_rules! echo {
    ($($arg:tt)*) => {
        $crate::console::echo(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::console::error(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! echo_lines {
    ($($arg:tt)*) => {
        $crate::console::echo_lines(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_table() {
        let headers = vec!["Index".to_string(), "Key".to_string()];
        let rows = vec![vec!["0".to_string(), "apple".to_string()]];
        let table = echo_table(&headers, &rows);
        let expected = "+-----+-----+\n\
                        |Index|Key  |\n\
                        +-----+-----+\n\
                        |0    |apple|\n\
                        +-----+-----+\n";
        assert_eq!(table, expected);
    }

    #[test]
    fn test_display_bytes() {
        assert_eq!(display_bytes(b"key0001"), "key0001");
        assert_eq!(display_bytes(&[1, 0, 0, 0, 0, 0, 0, 0]), "0x0100000000000000");
        assert_eq!(display_bytes(b""), "");
    }
}
