use crossterm::{
    event::DisableMouseCapture,
    execute,
    terminal::{LeaveAlternateScreen, disable_raw_mode},
};
use log::error;
use std::io::{self, Write};
use std::panic;

/// Installs `better_panic` and a hook that gives the terminal back before the
/// panic report is printed.
pub fn initialize_panic_handler() {
    better_panic::install();

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        restore_terminal();
        error!("Reader panicked: {panic_info}");

        default_hook(panic_info);

        std::process::exit(1);
    }));
}

/// Leaves raw mode and the alternate screen, and shows the cursor again.
pub fn restore_terminal() {
    let _ = disable_raw_mode();
    let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
    let _ = execute!(io::stderr(), crossterm::cursor::Show);
    let _ = writeln!(io::stderr());
}
