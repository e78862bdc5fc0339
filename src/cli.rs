//! L3: CLI parser.
//!
//! A character-fed state machine that tokenizes a command line into a
//! command name plus up to [`NUM_OF_ARGUMENT`] `-flag value` pairs, looks the
//! command up in a static table, and hands the parsed tokens to its
//! callback. Quote-delimited values may embed spaces; anything else is
//! whitespace-separated. A line that doesn't fit in the backing buffer, or
//! that names an unknown command or argument, drops the rest of the line and
//! reports an error instead of running anything.

use arrayvec::ArrayString;

use crate::status::Status;

/// How many `-flag value` pairs one command line may carry.
pub const NUM_OF_ARGUMENT: usize = 2;
/// Longest a single token (command name, flag, or value) may be.
pub const MAX_TOKEN_LEN: usize = 32;

pub type Token = ArrayString<MAX_TOKEN_LEN>;

/// What a command callback reports back to the parser once it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliNotify {
    /// Ran fine; the buffer holds a response to send back.
    Ok,
    /// Arguments were malformed; print the command's usage helper.
    BadArg,
    /// Ran, but failed; the buffer holds an error message to send back.
    Err,
}

/// `fn(response_buffer, args, values) -> CliNotify`. `args`/`values` are
/// parallel arrays: `args[i]` is the flag matched for pair `i` (long or
/// short form, whichever the line used) and `values[i]` its value, both
/// empty strings for pairs the line didn't supply.
pub type CommandCallback = fn(&mut [u8], &[Token; NUM_OF_ARGUMENT], &[Token; NUM_OF_ARGUMENT]) -> CliNotify;

/// One entry in a command table: its name, the help text, the callback, and
/// the long/short argument spellings it accepts (matched positionally with
/// `arg_descriptions` for the usage helper).
pub struct CliCommand {
    pub name: &'static str,
    pub description: &'static str,
    pub callback: CommandCallback,
    pub long_args: &'static [&'static str],
    pub short_args: &'static [&'static str],
    pub arg_descriptions: &'static [&'static str],
}

/// The byte transport a [`Cli`] reads input from and writes output to.
/// `get_char` returns `0` when nothing is available yet (matching the C
/// convention of a NUL "no data" sentinel); a real backend should poll its
/// UART/USB RX ring here.
pub trait CliInterface: Send + Sync {
    fn get_char(&self) -> u8;
    fn send_chars(&self, data: &[u8]);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CliState {
    Command,
    Argument,
    Value,
    Error,
}

/// One parser instance: a command table, an interface it polls, and a
/// caller-owned scratch buffer it uses both to accumulate the line's
/// eventual command-name bytes (for diagnostics) and as the response buffer
/// handed to callbacks.
pub struct Cli<'a> {
    commands: &'static [CliCommand],
    interface: &'a dyn CliInterface,
    buffer: &'a mut [u8],

    state: CliState,
    command_name: Token,
    current_cmd_idx: Option<usize>,
    current_arg_idx: usize,
    current_arg: Token,
    current_value: Token,
    is_arg_found: bool,
    in_quotes: bool,
    args: [Token; NUM_OF_ARGUMENT],
    values: [Token; NUM_OF_ARGUMENT],
}

impl<'a> Cli<'a> {
    /// Builds a parser over `commands`, prints the startup menu through
    /// `interface`, and returns it ready to run. `ArgInvalid` if `commands`
    /// or `buffer` is empty.
    pub fn new(
        commands: &'static [CliCommand],
        interface: &'a dyn CliInterface,
        buffer: &'a mut [u8],
    ) -> Result<Self, Status> {
        if commands.is_empty() || buffer.is_empty() {
            return Err(Status::ArgInvalid);
        }
        let mut cli = Cli {
            commands,
            interface,
            buffer,
            state: CliState::Command,
            command_name: Token::new(),
            current_cmd_idx: None,
            current_arg_idx: 0,
            current_arg: Token::new(),
            current_value: Token::new(),
            is_arg_found: false,
            in_quotes: false,
            args: [Token::new(), Token::new()],
            values: [Token::new(), Token::new()],
        };
        cli.print_menu();
        Ok(cli)
    }

    /// Pumps one character from the interface through the state machine, if
    /// one is available. Call this from the main loop or a dedicated task.
    pub fn run(&mut self) {
        let ch = self.interface.get_char();
        if ch == 0 {
            return;
        }

        // Leading whitespace between tokens is never significant, except
        // inside a quoted value where it is the point.
        if ch == b' ' && !self.in_quotes {
            match self.state {
                CliState::Command if self.command_name.is_empty() => return,
                CliState::Argument if self.current_arg.is_empty() => return,
                CliState::Value if self.current_value.is_empty() => return,
                _ => {}
            }
        }

        if ch == b'\r' || ch == b'\n' {
            match self.state {
                CliState::Error => self.handle_error(),
                _ => self.finish_line(),
            }
            return;
        }

        match self.state {
            CliState::Command => self.handle_command(ch),
            CliState::Argument => self.handle_argument(ch),
            CliState::Value => self.handle_value(ch),
            CliState::Error => {} // swallow until newline
        }
    }

    fn handle_command(&mut self, ch: u8) {
        if ch == b' ' {
            let commands = self.commands;
            match find_command(commands, self.command_name.as_str()) {
                Some(idx) => {
                    self.current_cmd_idx = Some(idx);
                    self.state = CliState::Argument;
                }
                None => self.enter_error(),
            }
            return;
        }
        if self.command_name.try_push(ch as char).is_err() {
            self.enter_error();
        }
    }

    fn handle_argument(&mut self, ch: u8) {
        if ch == b' ' {
            let commands = self.commands;
            let Some(cmd_idx) = self.current_cmd_idx else {
                self.enter_error();
                return;
            };
            if !arg_is_known(&commands[cmd_idx], self.current_arg.as_str()) {
                self.enter_error();
                return;
            }
            self.is_arg_found = true;
            self.state = CliState::Value;
            return;
        }
        if self.current_arg.try_push(ch as char).is_err() {
            self.enter_error();
        }
    }

    fn handle_value(&mut self, ch: u8) {
        if ch == b'"' {
            self.in_quotes = !self.in_quotes;
            return;
        }
        if ch == b' ' && !self.in_quotes {
            self.store_value();
            self.current_arg = Token::new();
            self.state = CliState::Argument;
            return;
        }
        if self.current_value.try_push(ch as char).is_err() {
            self.enter_error();
        }
    }

    fn handle_error(&mut self) {
        self.printf(format_args!("error: malformed command\r\n"));
        self.reset();
    }

    fn store_value(&mut self) {
        if self.current_arg_idx < NUM_OF_ARGUMENT {
            self.args[self.current_arg_idx] = core::mem::take(&mut self.current_arg);
            self.values[self.current_arg_idx] = core::mem::take(&mut self.current_value);
            self.current_arg_idx += 1;
        }
    }

    fn enter_error(&mut self) {
        self.state = CliState::Error;
    }

    fn finish_line(&mut self) {
        match self.state {
            CliState::Command => {
                let commands = self.commands;
                match find_command(commands, self.command_name.as_str()) {
                    Some(idx) => {
                        self.current_cmd_idx = Some(idx);
                        self.execute();
                    }
                    None => {
                        self.printf(format_args!("error: malformed command\r\n"));
                        self.reset();
                    }
                }
            }
            CliState::Value if self.is_arg_found => {
                self.store_value();
                self.execute();
            }
            CliState::Argument if self.current_arg.is_empty() && self.current_cmd_idx.is_some() => {
                self.execute();
            }
            _ => {
                self.printf(format_args!("error: malformed command\r\n"));
                self.reset();
            }
        }
    }

    fn execute(&mut self) {
        let Some(cmd_idx) = self.current_cmd_idx else {
            self.reset();
            return;
        };
        let commands = self.commands;
        let cmd = &commands[cmd_idx];
        let notify = (cmd.callback)(self.buffer, &self.args, &self.values);
        match notify {
            CliNotify::Ok => {
                let len = self.buffer.iter().position(|&b| b == 0).unwrap_or(self.buffer.len());
                self.interface.send_chars(&self.buffer[..len]);
            }
            CliNotify::Err => {
                let len = self.buffer.iter().position(|&b| b == 0).unwrap_or(self.buffer.len());
                self.interface.send_chars(&self.buffer[..len]);
                self.printf(format_args!("\r\n"));
            }
            CliNotify::BadArg => {
                self.printf(format_args!("error: bad arguments\r\n"));
                self.print_command_helper(cmd_idx);
            }
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.buffer.fill(0);
        self.state = CliState::Command;
        self.command_name = Token::new();
        self.current_cmd_idx = None;
        self.current_arg_idx = 0;
        self.current_arg = Token::new();
        self.current_value = Token::new();
        self.is_arg_found = false;
        self.in_quotes = false;
        self.args = [Token::new(), Token::new()];
        self.values = [Token::new(), Token::new()];
    }

    fn printf(&mut self, args: core::fmt::Arguments) {
        use core::fmt::Write;
        let mut writer = BufWriter { buf: self.buffer, pos: 0 };
        let _ = writer.write_fmt(args);
        let len = writer.pos;
        self.interface.send_chars(&self.buffer[..len]);
    }

    /// Prints every command's name and description. Called once at startup.
    pub fn print_menu(&mut self) {
        self.printf(format_args!("available commands:\r\n"));
        for idx in 0..self.commands.len() {
            self.print_one(idx);
        }
    }

    fn print_command_helper(&mut self, idx: usize) {
        self.printf(format_args!("usage:\r\n"));
        self.print_one(idx);
    }

    fn print_one(&mut self, idx: usize) {
        let commands = self.commands;
        let cmd = &commands[idx];
        self.printf(format_args!("  {} - {}\r\n", cmd.name, cmd.description));
        for i in 0..cmd.arg_descriptions.len() {
            let long = cmd.long_args.get(i).copied().unwrap_or("");
            let short = cmd.short_args.get(i).copied().unwrap_or("");
            if long.is_empty() && short.is_empty() {
                continue;
            }
            self.printf(format_args!("      {} / {} - {}\r\n", long, short, cmd.arg_descriptions[i]));
        }
    }
}

fn find_command(commands: &'static [CliCommand], name: &str) -> Option<usize> {
    commands.iter().position(|cmd| cmd.name == name)
}

fn arg_is_known(cmd: &CliCommand, token: &str) -> bool {
    cmd.long_args.contains(&token) || cmd.short_args.contains(&token)
}

/// Formats into a fixed byte slice, tracking how much of it was written.
/// Mirrors `log::RingSink`'s `ByteSink` but writes straight into a borrowed
/// buffer rather than a ring.
struct BufWriter<'b> {
    buf: &'b mut [u8],
    pos: usize,
}

impl core::fmt::Write for BufWriter<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        let remaining = self.buf.len() - self.pos;
        let n = bytes.len().min(remaining);
        self.buf[self.pos..self.pos + n].copy_from_slice(&bytes[..n]);
        self.pos += n;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::RefCell;
    use spin::Mutex;

    struct ScriptedInterface {
        script: RefCell<std::vec::Vec<u8>>,
        sent: RefCell<std::vec::Vec<u8>>,
    }

    impl ScriptedInterface {
        fn new(script: &str) -> Self {
            ScriptedInterface {
                script: RefCell::new(script.as_bytes().iter().rev().copied().collect()),
                sent: RefCell::new(std::vec::Vec::new()),
            }
        }
    }

    impl CliInterface for ScriptedInterface {
        fn get_char(&self) -> u8 {
            self.script.borrow_mut().pop().unwrap_or(0)
        }
        fn send_chars(&self, data: &[u8]) {
            self.sent.borrow_mut().extend_from_slice(data);
        }
    }

    fn leaked(size: usize) -> &'static mut [u8] {
        Box::leak(std::vec![0u8; size].into_boxed_slice())
    }

    static CAPTURED: Mutex<std::vec::Vec<(std::string::String, std::string::String)>> = Mutex::new(std::vec::Vec::new());

    fn record_command(
        buf: &mut [u8],
        args: &[Token; NUM_OF_ARGUMENT],
        values: &[Token; NUM_OF_ARGUMENT],
    ) -> CliNotify {
        let mut captured = CAPTURED.lock();
        captured.clear();
        for i in 0..NUM_OF_ARGUMENT {
            if !args[i].is_empty() {
                captured.push((args[i].as_str().into(), values[i].as_str().into()));
            }
        }
        buf[..2].copy_from_slice(b"ok");
        CliNotify::Ok
    }

    static RECORD_CMD: CliCommand = CliCommand {
        name: "c",
        description: "records its parsed args",
        callback: record_command,
        long_args: &["--a1", "--a2"],
        short_args: &["-a1", "-a2"],
        arg_descriptions: &["first", "second"],
    };

    static RECORD_TABLE: [CliCommand; 1] = [RECORD_CMD];

    #[test]
    fn short_and_long_args_with_quoted_value_are_parsed() {
        let iface = ScriptedInterface::new("c -a1 v1 -a2 v2\n");
        let mut cli = Cli::new(&RECORD_TABLE, &iface, leaked(128)).unwrap();
        for _ in 0..256 {
            cli.run();
        }
        let captured = CAPTURED.lock();
        assert_eq!(captured.len(), 2);
        assert_eq!(captured[0].0, "-a1");
        assert_eq!(captured[0].1, "v1");
        assert_eq!(captured[1].0, "-a2");
        assert_eq!(captured[1].1, "v2");
        drop(captured);

        let iface2 = ScriptedInterface::new("c --a1 \"hello world\"\n");
        let mut cli2 = Cli::new(&RECORD_TABLE, &iface2, leaked(128)).unwrap();
        for _ in 0..256 {
            cli2.run();
        }
        let captured2 = CAPTURED.lock();
        assert_eq!(captured2.len(), 1);
        assert_eq!(captured2[0].0, "--a1");
        assert_eq!(captured2[0].1, "hello world");
    }

    fn echo_command(
        buf: &mut [u8],
        _args: &[Token; NUM_OF_ARGUMENT],
        values: &[Token; NUM_OF_ARGUMENT],
    ) -> CliNotify {
        let value = values[0].as_bytes();
        buf[..value.len()].copy_from_slice(value);
        CliNotify::Ok
    }

    static ECHO_CMD: CliCommand = CliCommand {
        name: "echo",
        description: "echoes its argument back",
        callback: echo_command,
        long_args: &["--say"],
        short_args: &["-s"],
        arg_descriptions: &["text to echo"],
    };

    static ECHO_TABLE: [CliCommand; 1] = [ECHO_CMD];

    #[test]
    fn echo_with_embedded_space_value_round_trips() {
        let iface = ScriptedInterface::new("echo -s \"Hello world\"\n");
        let mut cli = Cli::new(&ECHO_TABLE, &iface, leaked(128)).unwrap();
        for _ in 0..256 {
            cli.run();
        }
        let sent = iface.sent.borrow();
        let sent_str = core::str::from_utf8(&sent).unwrap();
        assert!(sent_str.contains("Hello world"), "got {sent_str:?}");
    }

    #[test]
    fn unknown_command_reports_error_and_recovers() {
        let iface = ScriptedInterface::new("bogus\nc -a1 v1\n");
        let mut cli = Cli::new(&RECORD_TABLE, &iface, leaked(128)).unwrap();
        for _ in 0..256 {
            cli.run();
        }
        let sent = iface.sent.borrow();
        let sent_str = core::str::from_utf8(&sent).unwrap();
        assert!(sent_str.contains("malformed"), "got {sent_str:?}");
    }

    #[test]
    fn new_rejects_empty_command_table() {
        let iface = ScriptedInterface::new("");
        let empty: &'static [CliCommand] = &[];
        assert_eq!(Cli::new(empty, &iface, leaked(16)).unwrap_err(), Status::ArgInvalid);
    }
}
