/// Preview: interactive console player for stories.
///
/// Usage: preview --stories <path> [--settings <file>] [--actor <name>]...
///
/// Commands:
///   list                 list loaded stories
///   play <title>         start a story conversation
///   (empty line) / next  advance past the current line
///   <n>                  pick response n from the menu
///   jump <path>          start the next conversation at a knot
///   vars                 show the variable store
///   set <name> <value>   set a story variable (true/false, number, text)
///   save / load          record or apply persistent data
///   actors <title>       list actors referenced by a story
///   help                 list commands
///   quit                 exit

use narrative_bridge::core::bridge::StoryBridge;
use narrative_bridge::core::host::MemoryHost;
use narrative_bridge::core::runner::{ConversationRunner, Response, Turn};
use narrative_bridge::core::script::ScriptStory;
use narrative_bridge::core::settings::BridgeSettings;
use narrative_bridge::schema::actor::{ActorId, ActorRegistry};
use narrative_bridge::schema::value::Value;
use std::io::{self, BufRead, Write};
use std::path::Path;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let mut stories_path = None;
    let mut settings_path = None;
    let mut actor_names = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--stories" if i + 1 < args.len() => {
                i += 1;
                stories_path = Some(args[i].clone());
            }
            "--settings" if i + 1 < args.len() => {
                i += 1;
                settings_path = Some(args[i].clone());
            }
            "--actor" if i + 1 < args.len() => {
                i += 1;
                actor_names.push(args[i].clone());
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let Some(stories_path) = stories_path else {
        eprintln!("ERROR: --stories is required");
        print_usage();
        std::process::exit(1);
    };

    let mut actors = ActorRegistry::with_reserved();
    for name in &actor_names {
        actors.add(name, false);
    }
    let host = MemoryHost::with_actors(actors.clone()).shared();

    let mut builder = StoryBridge::<ScriptStory>::builder().host(host.clone());
    if let Some(ref path) = settings_path {
        match BridgeSettings::load_from_ron(Path::new(path)) {
            Ok(settings) => builder = builder.settings(settings),
            Err(e) => {
                eprintln!("ERROR loading settings {}: {}", path, e);
                std::process::exit(1);
            }
        }
    }
    let p = Path::new(&stories_path);
    builder = if p.is_dir() {
        builder.stories_dir(&stories_path)
    } else {
        builder.story_file(&stories_path)
    };

    let mut bridge = match builder.build() {
        Ok(bridge) => bridge,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    println!("Loaded {} stories", bridge.story_titles().len());
    println!("Type 'help' for commands.\n");

    let mut runner = ConversationRunner::new();
    let mut menu: Vec<Response> = Vec::new();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("preview> ");
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim();
        let parts: Vec<&str> = line.split_whitespace().collect();
        let cmd = parts.first().map(|c| c.to_lowercase()).unwrap_or_default();

        match cmd.as_str() {
            "quit" | "exit" | "q" => {
                println!("Goodbye.");
                break;
            }
            "help" | "h" | "?" => print_help(),
            "list" => {
                for title in bridge.story_titles() {
                    println!("  {}", title);
                }
            }
            "play" => {
                if parts.len() < 2 {
                    println!("Usage: play <title>");
                    continue;
                }
                menu.clear();
                let turn = runner.start(&mut bridge, parts[1], None, None);
                show_turn(turn, &actors, &mut menu);
            }
            "" | "next" | "n" => {
                if !menu.is_empty() {
                    println!("Pick a response by number.");
                    continue;
                }
                let turn = runner.next(&mut bridge);
                show_turn(turn, &actors, &mut menu);
            }
            "jump" => {
                if parts.len() < 2 {
                    println!("Usage: jump <path>");
                    if let Some(point) = bridge.lifecycle().last_starting_point() {
                        println!("  Last starting point: {}", point);
                    }
                    continue;
                }
                bridge.set_conversation_starting_point(parts[1]);
                println!("Next conversation starts at '{}'.", parts[1]);
            }
            "vars" => {
                let variables = bridge.variables();
                let mut names: Vec<(&String, &Value)> = variables.iter().collect();
                names.sort_by(|a, b| a.0.cmp(b.0));
                for (name, value) in names {
                    println!("  {} = {}", name, value);
                }
            }
            "set" => {
                if parts.len() < 3 {
                    println!("Usage: set <name> <value>");
                    continue;
                }
                let value = parse_value(&parts[2..].join(" "));
                if bridge.set_story_variable(parts[1], value) {
                    println!("{} = {}", parts[1], bridge.story_variable(parts[1]).unwrap_or_default());
                } else {
                    println!("No story declares '{}'.", parts[1]);
                }
            }
            "save" => match bridge.record_persistent_data() {
                Ok(()) => println!("Story state recorded."),
                Err(e) => println!("ERROR: {}", e),
            },
            "load" => {
                menu.clear();
                runner = ConversationRunner::new();
                match bridge.apply_persistent_data() {
                    Some(title) => {
                        println!("Resuming '{}'.", title);
                        let turn = runner.start(&mut bridge, &title, None, None);
                        show_turn(turn, &actors, &mut menu);
                    }
                    None => println!("Story state applied; nothing to resume."),
                }
            }
            "actors" => {
                if parts.len() < 2 {
                    println!("Usage: actors <title> [path]");
                    continue;
                }
                match bridge.actors_in_story(parts[1], parts.get(2).copied()) {
                    Ok(names) if names.is_empty() => println!("  (none)"),
                    Ok(names) => {
                        for name in names {
                            println!("  {}", name);
                        }
                    }
                    Err(e) => println!("ERROR: {}", e),
                }
            }
            _ => {
                let Ok(n) = cmd.parse::<usize>() else {
                    println!("Unknown command '{}'. Type 'help' for commands.", cmd);
                    continue;
                };
                let Some(response) = n.checked_sub(1).and_then(|i| menu.get(i)).cloned() else {
                    println!("No response {}.", n);
                    continue;
                };
                menu.clear();
                let turn = runner.choose(&mut bridge, response.entry);
                show_turn(turn, &actors, &mut menu);
            }
        }

        for alert in host.borrow_mut().alerts.drain(..) {
            println!("  [alert] {}", alert);
        }
        for played in host.borrow_mut().sequences.drain(..) {
            println!("  [sequence] {}", played.sequence);
        }
    }
}

fn show_turn(
    turn: Result<Turn, narrative_bridge::core::bridge::BridgeError>,
    actors: &ActorRegistry,
    menu: &mut Vec<Response>,
) {
    match turn {
        Ok(Turn::Line(subtitle)) => {
            println!("{}: {}", actor_name(actors, subtitle.speaker), subtitle.text);
            if !subtitle.sequence.is_empty() {
                println!("  [sequence] {}", subtitle.sequence);
            }
        }
        Ok(Turn::Menu(responses)) => {
            for (i, response) in responses.iter().enumerate() {
                println!("  {}. {}", i + 1, response.text);
            }
            *menu = responses;
        }
        Ok(Turn::Ended) => println!("--- End ---\n"),
        Err(e) => println!("ERROR: {}", e),
    }
}

fn actor_name(actors: &ActorRegistry, id: ActorId) -> String {
    actors
        .get(id)
        .map(|a| a.name.clone())
        .unwrap_or_else(|| format!("Actor {}", id.0))
}

fn parse_value(s: &str) -> Value {
    match s.to_lowercase().as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => match s.parse::<f64>() {
            Ok(n) => Value::Number(n),
            Err(_) => Value::Text(s.to_string()),
        },
    }
}

fn print_usage() {
    println!("Usage: preview --stories <path> [--settings <file>] [--actor <name>]...");
    println!();
    println!("  --stories   A story .ron file, or a directory of them");
    println!("  --settings  Bridge settings .ron file");
    println!("  --actor     Register an actor name with the host (repeatable)");
}

fn print_help() {
    println!("Commands:");
    println!("  list                 List loaded stories");
    println!("  play <title>         Start a story conversation");
    println!("  (enter) / next       Advance past the current line");
    println!("  <n>                  Pick response n from the menu");
    println!("  jump <path>          Start the next conversation at a knot");
    println!("  vars                 Show the variable store");
    println!("  set <name> <value>   Set a story variable");
    println!("  save / load          Record or apply persistent data");
    println!("  actors <title> [p]   List actors referenced by a story");
    println!("  help                 Show this help");
    println!("  quit                 Exit");
}
