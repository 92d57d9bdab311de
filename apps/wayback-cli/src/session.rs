use serde_json::Value;

/// One line of input in an interactive session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Push(Value),
    Back,
    Forward,
    Go(i64),
    Peek(i64),
    State,
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  push <json>   record a new state at the tip (forks if behind it)
  back          go to the previous state
  forward       go to the next state
  go <n>        move by n entries
  peek <n>      check whether go <n> would move
  state         print the current state
  status        print position, length and reachability
  help          show this message
  quit          end the session";

/// Parse a session input line. Blank lines parse to `None`.
pub fn parse_command(line: &str) -> Result<Option<SessionCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let cmd = match word {
        "push" => {
            if rest.is_empty() {
                return Err("push needs a JSON value".into());
            }
            let value = serde_json::from_str(rest).map_err(|e| format!("invalid JSON: {e}"))?;
            SessionCommand::Push(value)
        }
        "back" => SessionCommand::Back,
        "forward" => SessionCommand::Forward,
        "go" => SessionCommand::Go(parse_delta(rest)?),
        "peek" => SessionCommand::Peek(parse_delta(rest)?),
        "state" => SessionCommand::State,
        "status" => SessionCommand::Status,
        "help" | "?" => SessionCommand::Help,
        "quit" | "exit" => SessionCommand::Quit,
        other => return Err(format!("unknown command: {other} (try `help`)")),
    };
    Ok(Some(cmd))
}

fn parse_delta(arg: &str) -> Result<i64, String> {
    if arg.is_empty() {
        return Ok(0);
    }
    arg.parse().map_err(|_| format!("expected an integer, got {arg:?}"))
}
