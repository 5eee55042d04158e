use log::{debug, info};
use squawkbox::decode_page_set;
use std::env;
use std::fs::File;
use std::io::prelude::*;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    // Display help information if no pageset file provided
    if args.len() < 2 {
        println!("squawkbox - page graph decoder for legacy talker pageset files");
        println!();
        println!("Usage: {} <pageset file> [--json <out.json>]", args[0]);
        println!("Examples:");
        println!("  {} backups/device.pgf", args[0]);
        println!("  {} backups/device.pgf --json graph.json", args[0]);
        println!();
        println!("The --json option writes the full decoded page graph;");
        println!("without it only the decode summary is printed.");
        return Ok(());
    }

    let pageset_path = &args[1];

    let mut json_path = None;
    if args.len() >= 4 && args[2] == "--json" {
        json_path = Some(args[3].clone());
    }

    // Load the pageset file with user-friendly error handling
    debug!("Loading pageset file: {}", pageset_path);
    let mut file = match File::open(pageset_path) {
        Ok(file) => file,
        Err(e) => {
            match e.kind() {
                std::io::ErrorKind::NotFound => {
                    eprintln!("Error: Pageset file not found: {}", pageset_path);
                    eprintln!();
                    eprintln!("Please check:");
                    eprintln!("• File path is correct");
                    eprintln!("• You're running from the right directory");
                    eprintln!("• File exists and is readable");
                }
                std::io::ErrorKind::PermissionDenied => {
                    eprintln!(
                        "Error: Permission denied accessing pageset file: {}",
                        pageset_path
                    );
                    eprintln!();
                    eprintln!("Please check file permissions.");
                }
                _ => {
                    eprintln!("Error: Cannot open pageset file '{}': {}", pageset_path, e);
                }
            }
            std::process::exit(1);
        }
    };
    let mut bytes = Vec::new();
    if let Err(e) = file.read_to_end(&mut bytes) {
        eprintln!("Error: Cannot read pageset file '{}': {}", pageset_path, e);
        std::process::exit(1);
    }

    let set = match decode_page_set(&bytes) {
        Ok(set) => set,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "decoded {} pages, {} buttons",
        set.pages.len(),
        set.button_count()
    );
    print!("{}", set);

    for (page_id, sequence, target) in set.unresolved_targets() {
        debug!(
            "unresolved target {:?} (page {} button {})",
            target, page_id, sequence
        );
    }

    if let Some(path) = json_path {
        let out = File::create(&path)?;
        serde_json::to_writer_pretty(out, &set)?;
        println!("Wrote page graph to {}", path);
    }

    Ok(())
}
