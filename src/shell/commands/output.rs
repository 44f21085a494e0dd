//! Printing for command output that may be piped into a reader that exits
//! early (`zipvfs a.zip < script | head`). A closed stdout ends the command
//! with `Ok(())` instead of an error.

/// `println!` that returns `Ok(())` from the enclosing function on BrokenPipe
macro_rules! print_line {
    ($($arg:tt)*) => {{
        use std::io::Write;
        match writeln!(std::io::stdout(), $($arg)*) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
    }};
}

/// `print!` counterpart of [`print_line`]
macro_rules! print_str {
    ($($arg:tt)*) => {{
        use std::io::Write;
        match write!(std::io::stdout(), $($arg)*) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
    }};
}

pub(crate) use print_line;
pub(crate) use print_str;
