// Operator console for --interactive sessions
//
// Reads commands from stdin and writes them to the control gate or the
// stream-selection channel. Closing stdin while the gate says `wait` stops
// the session, since nobody is left to start it.

use nfb_rs::stream::OperatorPanel;
use nfb_rs::{ControlGate, GateState};
use std::io::{self, BufRead};
use std::thread;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Gate(GateState),
    Select(usize),
}

pub fn parse_command(line: &str) -> Result<ConsoleCommand, String> {
    let mut words = line.split_whitespace();
    match (words.next(), words.next()) {
        (Some("select" | "use"), Some(index)) => index
            .parse()
            .map(ConsoleCommand::Select)
            .map_err(|_| format!("Invalid stream index '{}'", index)),
        (Some(word), None) => word.parse().map(ConsoleCommand::Gate),
        _ => Err(format!("Unknown command '{}'", line.trim())),
    }
}

/// Start the console threads; they live until stdin closes or the session ends
pub fn spawn<R>(input: R, gate: ControlGate, panel: OperatorPanel) -> io::Result<()>
where
    R: BufRead + Send + 'static,
{
    let picker = panel.clone();
    thread::Builder::new()
        .name("stream-picker".to_string())
        .spawn(move || {
            while let Some(candidates) = picker.recv_candidates() {
                eprintln!("Several streams are available:");
                for (index, info) in candidates.iter().enumerate() {
                    eprintln!(
                        "  [{}] {} (serial {}), {} ch @ {} Hz",
                        index, info.name, info.serial, info.channel_count, info.sample_rate
                    );
                }
                eprintln!("Type `select N` to choose one");
            }
        })?;

    thread::Builder::new()
        .name("operator-console".to_string())
        .spawn(move || read_commands(input, &gate, &panel))?;

    Ok(())
}

fn read_commands<R: BufRead>(input: R, gate: &ControlGate, panel: &OperatorPanel) {
    for line in input.lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        match parse_command(&line) {
            Ok(ConsoleCommand::Gate(state)) => {
                log::info!("Operator set the session to {}", state);
                gate.write(state);
            }
            Ok(ConsoleCommand::Select(index)) => {
                if !panel.select(index) {
                    log::warn!("Stream selection is already closed");
                }
            }
            Err(e) => log::warn!("{}", e),
        }
    }

    if gate.read() == GateState::Wait {
        log::warn!("Operator console closed while waiting, stopping the session");
        gate.write(GateState::Stop);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("start"), Ok(ConsoleCommand::Gate(GateState::Run)));
        assert_eq!(parse_command(" STOP "), Ok(ConsoleCommand::Gate(GateState::Stop)));
        assert_eq!(parse_command("pause"), Ok(ConsoleCommand::Gate(GateState::Wait)));
        assert_eq!(parse_command("select 2"), Ok(ConsoleCommand::Select(2)));
        assert!(parse_command("select two").is_err());
        assert!(parse_command("launch").is_err());
        assert!(parse_command("start now").is_err());
    }

    #[test]
    fn test_commands_drive_gate() {
        let gate = ControlGate::new(GateState::Wait);
        let (_link, panel) = nfb_rs::operator_channel();

        read_commands(Cursor::new("start\nbogus\n"), &gate, &panel);

        assert_eq!(gate.read(), GateState::Run);
    }

    #[test]
    fn test_closed_input_stops_waiting_session() {
        let gate = ControlGate::new(GateState::Wait);
        let (_link, panel) = nfb_rs::operator_channel();

        read_commands(Cursor::new(""), &gate, &panel);

        assert_eq!(gate.read(), GateState::Stop);
    }
}
