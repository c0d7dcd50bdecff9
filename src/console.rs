use crate::detection::Strategy;
use crate::session::CancellationSource;
use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

const ESC: char = '\u{1b}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Run(Strategy),
    Exit,
}

/// Parse one menu line: `1`..`3` select a strategy, `4` exits
pub fn parse_choice(line: &str) -> Option<MenuChoice> {
    match line.trim().parse::<u32>().ok()? {
        n @ 1..=3 => Some(MenuChoice::Run(Strategy::ALL[n as usize - 1])),
        4 => Some(MenuChoice::Exit),
        _ => None,
    }
}

/// True for a line asking to leave the running session (`q` or ESC)
pub fn is_quit(line: &str) -> bool {
    let line = line.trim();
    line.eq_ignore_ascii_case("q") || line.contains(ESC)
}

/// Line-based terminal input shared by the menu and the session loop
///
/// A single reader thread owns stdin and forwards lines over a channel, so
/// the detection loop can poll for quit keys without blocking.
pub struct Console {
    lines: Receiver<String>,
    closed: bool,
}

impl Console {
    pub fn stdin() -> Self {
        Self::from_reader(std::io::BufReader::new(std::io::stdin()))
    }

    pub fn from_reader<R>(reader: R) -> Self
    where
        R: BufRead + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            for line in reader.lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Console read failed: {}", e);
                        break;
                    }
                }
            }
            tracing::debug!("Console input closed");
        });
        Self {
            lines: rx,
            closed: false,
        }
    }

    /// Block for the next line, `None` once input is closed
    pub fn next_line(&self) -> Option<String> {
        self.lines.recv().ok()
    }

    /// Show the menu until a valid choice is entered; closed input exits
    pub fn prompt_menu(&self) -> MenuChoice {
        println!("Available background subtraction algorithms:");
        for (i, strategy) in Strategy::ALL.iter().enumerate() {
            println!("{}) {}", i + 1, strategy.description());
        }
        println!("4) exit");

        loop {
            println!("Please choose number between 1 and 4");
            let Some(line) = self.next_line() else {
                return MenuChoice::Exit;
            };
            if let Some(choice) = parse_choice(&line) {
                return choice;
            }
        }
    }

    /// Discard input typed while no session was listening
    pub fn drain(&self) {
        while self.lines.try_recv().is_ok() {}
    }
}

impl CancellationSource for Console {
    fn is_requested(&mut self) -> bool {
        loop {
            match self.lines.try_recv() {
                Ok(line) if is_quit(&line) => return true,
                Ok(_) => continue,
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Disconnected) => {
                    if !self.closed {
                        self.closed = true;
                        tracing::warn!(
                            "Console input closed, the session now ends only at the frame \
                             limit or end of input"
                        );
                    }
                    return false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::{Duration, Instant};

    #[test]
    fn menu_numbers_map_to_choices() {
        assert_eq!(
            parse_choice("1"),
            Some(MenuChoice::Run(Strategy::FrameDifference))
        );
        assert_eq!(
            parse_choice(" 2 \n"),
            Some(MenuChoice::Run(Strategy::AdaptiveBackground))
        );
        assert_eq!(
            parse_choice("3"),
            Some(MenuChoice::Run(Strategy::MixtureOfGaussians))
        );
        assert_eq!(parse_choice("4"), Some(MenuChoice::Exit));
    }

    #[test]
    fn out_of_range_input_is_rejected() {
        for line in ["0", "5", "-1", "", "two", "1.5"] {
            assert_eq!(parse_choice(line), None, "{line:?}");
        }
    }

    #[test]
    fn quit_keys() {
        assert!(is_quit("q"));
        assert!(is_quit("Q\n"));
        assert!(is_quit("\u{1b}"));
        assert!(!is_quit("quit later"));
        assert!(!is_quit(""));
    }

    #[test]
    fn menu_skips_invalid_lines() {
        let console = Console::from_reader(Cursor::new("9\nfoo\n2\n"));
        assert_eq!(
            console.prompt_menu(),
            MenuChoice::Run(Strategy::AdaptiveBackground)
        );
    }

    #[test]
    fn closed_input_exits_menu() {
        let console = Console::from_reader(Cursor::new(""));
        assert_eq!(console.prompt_menu(), MenuChoice::Exit);
    }

    #[test]
    fn closed_input_never_cancels() {
        let mut console = Console::from_reader(Cursor::new(""));
        let deadline = Instant::now() + Duration::from_secs(5);
        while !console.closed {
            assert!(!console.is_requested());
            assert!(Instant::now() < deadline, "input never closed");
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!console.is_requested());
    }

    #[test]
    fn quit_line_cancels_session() {
        let mut console = Console::from_reader(Cursor::new("hello\nq\n"));
        let deadline = Instant::now() + Duration::from_secs(5);
        while !console.is_requested() {
            assert!(Instant::now() < deadline, "quit line never arrived");
            thread::sleep(Duration::from_millis(5));
        }
    }
}
