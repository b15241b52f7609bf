//! Headless line protocol for the party engine.
//!
//! Each input line is either an agent command (`<id> <verb> ...`), a
//! `spawn`, or a `#` driver command. Output lines are tagged with a
//! bracketed keyword so scripts can match on them.

use party_core::{AgentId, CharacterClass, Creature, EngineConfig, FightOutcome, PartyEngine};
use std::io::{self, BufRead, Write};
use tracing::debug;

/// A parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Spawn(Option<AgentId>),
    Create(AgentId, CharacterClass),
    Fight(AgentId, Creature, i64),
    Stats(AgentId),
    Join(AgentId, AgentId),
    Leave(AgentId),
    Exit(AgentId),
    Dump,
    Check,
    Help,
    Quit,
}

/// What the loop should do after a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Lines(Vec<String>),
    Quit,
}

/// Engine plus protocol state for one run.
pub struct Driver {
    engine: PartyEngine,
}

impl Driver {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            engine: PartyEngine::new(config),
        }
    }

    /// Handle one input line. Blank lines produce no output.
    pub fn handle(&self, line: &str) -> Reply {
        let line = line.trim();
        if line.is_empty() {
            return Reply::Lines(Vec::new());
        }
        match parse_command(line) {
            Ok(Command::Quit) => Reply::Quit,
            Ok(command) => {
                debug!(?command, "driver command");
                Reply::Lines(self.execute(command))
            }
            Err(message) => Reply::Lines(vec![format!("[ERROR] {message}")]),
        }
    }

    fn execute(&self, command: Command) -> Vec<String> {
        let engine = &self.engine;
        let line = match command {
            Command::Spawn(parent) => {
                if let Some(parent) = parent {
                    if engine.resolve_agent(parent).is_none() {
                        return vec![format!("[ERROR] no such agent: {parent}")];
                    }
                }
                format!("[SPAWNED] {}", engine.spawn_agent(parent))
            }
            Command::Create(agent, class) => match engine.create_character(agent, class) {
                Ok(()) => format!("[CREATED] {agent} {class}"),
                Err(e) => format!("[ERROR] {e}"),
            },
            Command::Fight(agent, creature, level) => match engine.fight(agent, creature, level) {
                Ok(report) => {
                    let tag = match report.outcome {
                        FightOutcome::Win => "[WIN]",
                        FightOutcome::Lose => "[LOSE]",
                    };
                    format!(
                        "{tag} strength {} vs {} level {}",
                        report.strength, report.creature, report.creature_level
                    )
                }
                Err(e) => format!("[ERROR] {e}"),
            },
            Command::Stats(agent) => match engine.get_stats(agent) {
                Ok(stats) => format!(
                    "[STATS] {agent} {} level {}, party {}, fighter levels {}, mage levels {}",
                    stats.class,
                    stats.level,
                    stats.party_size,
                    stats.fighter_levels,
                    stats.mage_levels
                ),
                Err(e) => format!("[ERROR] {e}"),
            },
            Command::Join(agent, target) => match engine.join(agent, target) {
                Ok(()) => match engine.party_of(agent) {
                    Ok((leader, party)) => format!(
                        "[JOINED] {agent} is in the party of {leader} ({} members)",
                        party.len()
                    ),
                    Err(e) => format!("[ERROR] {e}"),
                },
                Err(e) => format!("[ERROR] {e}"),
            },
            Command::Leave(agent) => {
                if engine.resolve_agent(agent).is_none() {
                    return vec![format!("[ERROR] no such agent: {agent}")];
                }
                engine.leave(agent);
                format!("[LEFT] {agent}")
            }
            Command::Exit(agent) => {
                if engine.resolve_agent(agent).is_none() {
                    return vec![format!("[ERROR] no such agent: {agent}")];
                }
                engine.on_agent_terminated(agent);
                format!("[EXITED] {agent}")
            }
            Command::Dump => match engine.snapshot().to_json_pretty() {
                Ok(json) => json,
                Err(e) => format!("[ERROR] {e}"),
            },
            Command::Check => {
                let snapshot = engine.snapshot();
                match snapshot.verify() {
                    Ok(()) => format!(
                        "[OK] {} agents, {} characters, {} parties",
                        snapshot.agents.len(),
                        snapshot.character_count(),
                        snapshot.leaders().len()
                    ),
                    Err(violation) => format!("[VIOLATION] {violation}"),
                }
            }
            Command::Help => return help_lines(),
            Command::Quit => return Vec::new(),
        };
        vec![line]
    }
}

/// Run the protocol over stdin until EOF or `#quit`.
pub fn run_headless(config: EngineConfig) -> io::Result<()> {
    let driver = Driver::new(config);
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        match driver.handle(&line) {
            Reply::Quit => break,
            Reply::Lines(lines) => {
                for out in lines {
                    writeln!(stdout, "{out}")?;
                }
            }
        }
        stdout.flush()?;
    }

    Ok(())
}

/// Parse a single protocol line.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let parts: Vec<&str> = line.split_whitespace().collect();

    if let Some(driver_command) = parts.first().and_then(|p| p.strip_prefix('#')) {
        return match driver_command {
            "dump" => Ok(Command::Dump),
            "check" => Ok(Command::Check),
            "help" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            _ => Err("Unknown command. Type #help for help.".to_string()),
        };
    }

    match parts.as_slice() {
        ["spawn"] => Ok(Command::Spawn(None)),
        ["spawn", parent] => Ok(Command::Spawn(Some(parse_agent(parent)?))),
        [agent, verb, rest @ ..] => {
            let agent = parse_agent(agent)?;
            match (*verb, rest) {
                ("create", [class]) => Ok(Command::Create(agent, class.parse()?)),
                ("fight", [creature, level]) => {
                    let level = level
                        .parse()
                        .map_err(|_| format!("invalid creature level '{level}'"))?;
                    Ok(Command::Fight(agent, creature.parse()?, level))
                }
                ("stats", []) => Ok(Command::Stats(agent)),
                ("join", [target]) => Ok(Command::Join(agent, parse_agent(target)?)),
                ("leave", []) => Ok(Command::Leave(agent)),
                ("exit", []) => Ok(Command::Exit(agent)),
                _ => Err(format!("Usage error for '{verb}'. Type #help for help.")),
            }
        }
        _ => Err("Unknown command. Type #help for help.".to_string()),
    }
}

fn parse_agent(s: &str) -> Result<AgentId, String> {
    s.parse::<u32>()
        .map(AgentId)
        .map_err(|_| format!("invalid agent id '{s}'"))
}

fn help_lines() -> Vec<String> {
    let mut lines = vec!["[HELP]".to_string()];
    lines.extend(COMMANDS.iter().map(|(usage, what)| format!("  {usage:<28} - {what}")));
    lines
}

const COMMANDS: &[(&str, &str)] = &[
    ("spawn [parent]", "Register a new agent"),
    ("<id> create fighter|mage", "Create the agent's character"),
    ("<id> fight orc|demon <level>", "Fight with the agent's whole party"),
    ("<id> stats", "Show the agent's stats"),
    ("<id> join <target>", "Join the party of <target>"),
    ("<id> leave", "Destroy the agent's character"),
    ("<id> exit", "Terminate the agent"),
    ("#dump", "Print the world as JSON"),
    ("#check", "Verify party invariants"),
    ("#help", "Show this help"),
    ("#quit", "Exit the driver"),
];

pub fn print_commands() {
    println!("COMMANDS:");
    for (usage, what) in COMMANDS {
        println!("  {usage:<28} - {what}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(driver: &Driver, line: &str) -> Vec<String> {
        match driver.handle(line) {
            Reply::Lines(lines) => lines,
            Reply::Quit => panic!("unexpected quit on '{line}'"),
        }
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("spawn"), Ok(Command::Spawn(None)));
        assert_eq!(parse_command("spawn 3"), Ok(Command::Spawn(Some(AgentId(3)))));
        assert_eq!(
            parse_command("2 create MAGE"),
            Ok(Command::Create(AgentId(2), CharacterClass::Mage))
        );
        assert_eq!(
            parse_command("2 fight orc -1"),
            Ok(Command::Fight(AgentId(2), Creature::Orc, -1))
        );
        assert_eq!(parse_command("2 join 7"), Ok(Command::Join(AgentId(2), AgentId(7))));
        assert_eq!(parse_command("#quit"), Ok(Command::Quit));
        assert!(parse_command("x create fighter").is_err());
        assert!(parse_command("2 create wizard").is_err());
        assert!(parse_command("2 fight orc").is_err());
        assert!(parse_command("#frobnicate").is_err());
    }

    #[test]
    fn test_session_script() {
        let driver = Driver::new(EngineConfig::default());
        assert_eq!(run(&driver, "spawn"), vec!["[SPAWNED] 1"]);
        assert_eq!(run(&driver, "spawn 1"), vec!["[SPAWNED] 2"]);
        assert_eq!(run(&driver, "1 create fighter"), vec!["[CREATED] 1 Fighter"]);
        assert_eq!(run(&driver, "2 create mage"), vec!["[CREATED] 2 Mage"]);
        assert_eq!(
            run(&driver, "2 join 1"),
            vec!["[JOINED] 2 is in the party of 1 (2 members)"]
        );
        assert_eq!(run(&driver, "1 fight orc 3"), vec!["[WIN] strength 3 vs Orc level 3"]);
        assert_eq!(
            run(&driver, "2 stats"),
            vec!["[STATS] 2 Mage level 2, party 2, fighter levels 2, mage levels 2"]
        );
        assert_eq!(run(&driver, "1 exit"), vec!["[EXITED] 1"]);
        assert_eq!(run(&driver, "#check"), vec!["[OK] 1 agents, 1 characters, 1 parties"]);
        assert_eq!(driver.handle("#quit"), Reply::Quit);
    }

    #[test]
    fn test_errors_keep_going() {
        let driver = Driver::new(EngineConfig::default());
        run(&driver, "spawn");
        assert!(run(&driver, "1 stats")[0].starts_with("[ERROR]"));
        assert!(run(&driver, "9 exit")[0].starts_with("[ERROR]"));
        assert!(run(&driver, "spawn 9")[0].starts_with("[ERROR]"));
        assert_eq!(run(&driver, "   "), Vec::<String>::new());
        assert_eq!(run(&driver, "1 create fighter"), vec!["[CREATED] 1 Fighter"]);
    }

    #[test]
    fn test_dump_is_json() {
        let driver = Driver::new(EngineConfig::default());
        run(&driver, "spawn");
        let dump = run(&driver, "#dump").join("\n");
        assert!(dump.contains("\"agents\""));
    }
}
