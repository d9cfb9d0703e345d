/// Story Linter: validates story scripts and reports the actors they use.
///
/// Usage: story_linter <story_file_or_dir> [--actor <name>]... [--names-precede-lines]
///
/// Every knot is checked for reachability from the start knot, and actor
/// discovery runs from the start knot and from each knot on its own. Actors
/// not registered with `--actor` (or reserved) are reported as warnings.

use narrative_bridge::core::discovery::discover_actors;
use narrative_bridge::core::script::{ScriptStory, Step, StoryScript};
use narrative_bridge::schema::actor::ActorRegistry;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::process;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: story_linter <story_file_or_dir> [--actor <name>]... [--names-precede-lines]");
        process::exit(0);
    }

    let story_path = Path::new(&args[1]);
    let mut known = ActorRegistry::with_reserved();
    let mut names_precede_lines = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--actor" if i + 1 < args.len() => {
                i += 1;
                known.add(&args[i], false);
            }
            "--names-precede-lines" => names_precede_lines = true,
            other => {
                eprintln!("Unknown argument: {}", other);
                process::exit(1);
            }
        }
        i += 1;
    }

    let files = if story_path.is_file() {
        vec![story_path.to_path_buf()]
    } else if story_path.is_dir() {
        let mut files = Vec::new();
        collect_story_files(story_path, &mut files);
        files.sort();
        files
    } else {
        eprintln!("ERROR: Path '{}' does not exist", story_path.display());
        process::exit(1);
    };

    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for path in &files {
        let title = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();
        match StoryScript::load_from_ron(path) {
            Ok(script) => {
                println!("  Loaded: {}", path.display());
                lint_story(&title, script, &known, names_precede_lines, &mut errors, &mut warnings);
            }
            Err(e) => errors.push(format!("{}: {}", path.display(), e)),
        }
    }

    println!("\n=== Story Lint Report ===\n");

    if errors.is_empty() && warnings.is_empty() {
        println!("All checks passed!");
    }

    for warning in &warnings {
        println!("WARNING: {}", warning);
    }

    for error in &errors {
        println!("ERROR: {}", error);
    }

    println!(
        "\nSummary: {} stories, {} errors, {} warnings",
        files.len(),
        errors.len(),
        warnings.len()
    );

    if errors.is_empty() {
        process::exit(0);
    } else {
        process::exit(1);
    }
}

fn collect_story_files(dir: &Path, files: &mut Vec<std::path::PathBuf>) {
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                collect_story_files(&path, files);
            } else if path.extension().and_then(|s| s.to_str()) == Some("ron") {
                files.push(path);
            }
        }
    }
}

fn lint_story(
    title: &str,
    script: StoryScript,
    known: &ActorRegistry,
    names_precede_lines: bool,
    errors: &mut Vec<String>,
    warnings: &mut Vec<String>,
) {
    let reachable = reachable_knots(&script);
    for knot in script.knots.keys() {
        if !reachable.contains(knot.as_str()) {
            warnings.push(format!("{}: knot '{}' is unreachable from '{}'", title, knot, script.start));
        }
        if script.knots[knot].is_empty() {
            warnings.push(format!("{}: knot '{}' is empty", title, knot));
        }
    }

    let knots: Vec<String> = script.knots.keys().cloned().collect();
    let template = script.clone();
    let story = match ScriptStory::from_script(script) {
        Ok(story) => story,
        Err(e) => {
            errors.push(format!("{}: {}", title, e));
            return;
        }
    };

    let mut referenced = BTreeSet::new();
    match discover_actors(story, None, names_precede_lines) {
        Ok(actors) => {
            println!("    {} actors: {}", title, actors.join(", "));
            referenced.extend(actors);
        }
        Err(e) => errors.push(format!("{}: discovery failed: {}", title, e)),
    }

    for knot in &knots {
        let Ok(copy) = ScriptStory::from_script(template.clone()) else {
            continue;
        };
        match discover_actors(copy, Some(knot), names_precede_lines) {
            Ok(actors) => {
                if !actors.is_empty() {
                    println!("      {}: {}", knot, actors.join(", "));
                }
                referenced.extend(actors);
            }
            Err(e) => errors.push(format!("{}: discovery from '{}' failed: {}", title, knot, e)),
        }
    }

    for name in referenced {
        if known.id_of(&name).is_none() {
            warnings.push(format!("{}: actor '{}' is not registered", title, name));
        }
    }
}

/// Knots reachable from the start knot through choices and diverts.
fn reachable_knots(script: &StoryScript) -> HashSet<&str> {
    let mut seen = HashSet::new();
    let mut stack = vec![script.start.as_str()];
    while let Some(knot) = stack.pop() {
        if !seen.insert(knot) {
            continue;
        }
        let Some(steps) = script.knots.get(knot) else {
            continue;
        };
        for step in steps {
            match step {
                Step::Divert(target)
                | Step::DivertIf { target, .. }
                | Step::Choice { target, .. } => stack.push(target.as_str()),
                _ => {}
            }
        }
    }
    seen
}
