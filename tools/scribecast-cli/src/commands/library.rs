//! Browse the content library.

use std::path::PathBuf;

use clap::Subcommand;

use scribecast_common::config::AppConfig;
use scribecast_content_model::{ContentLibrary, NodeKind};

#[derive(Subcommand)]
pub enum LibraryAction {
    /// List categories
    Categories,

    /// Print the folder tree of a category
    Tree {
        /// Category name (defaults to the current category)
        category: Option<String>,
    },

    /// Toggle selection of files and print the resulting selection
    Select {
        /// File ids
        #[arg(required = true)]
        ids: Vec<u64>,
    },

    /// Show the recording history
    History,

    /// Write the library as a JSON seed file
    Export {
        /// Destination path
        output: PathBuf,
    },
}

pub fn run(action: LibraryAction, config: &AppConfig) -> anyhow::Result<()> {
    let mut library = super::load_library(config)?;

    match action {
        LibraryAction::Categories => {
            for name in library.category_names() {
                let files: usize = library
                    .category(name)
                    .map(|nodes| nodes.iter().map(|n| n.file_count()).sum())
                    .unwrap_or_default();
                let marker = if name == library.current_category() { "*" } else { " " };
                println!("{marker} {name:<12} {files} files");
            }
        }
        LibraryAction::Tree { category } => {
            let category = category.unwrap_or_else(|| library.current_category().to_string());
            library.set_current_category(&category)?;
            print_tree(&library, &category)?;
        }
        LibraryAction::Select { ids } => {
            for id in ids {
                let selected = library.toggle_file_selection(id)?;
                tracing::debug!(id, selected, "Selection toggled");
            }
            println!("Selected files: {}", library.selected_files().len());
            for node in library.selected_nodes() {
                println!("  [{}] {}", node.id, node.name);
            }
        }
        LibraryAction::History => {
            println!("Your Recording History");
            println!("{}", "=".repeat(50));
            if library.history().is_empty() {
                println!("No recordings yet.");
            }
            for entry in library.history() {
                println!(
                    "{:<6} {:<32} {}  {}",
                    entry.kind.label(),
                    entry.name,
                    entry.date,
                    entry.duration
                );
            }
        }
        LibraryAction::Export { output } => {
            library.save(&output)?;
            println!("Library written to: {}", output.display());
        }
    }
    Ok(())
}

fn print_tree(library: &ContentLibrary, category: &str) -> anyhow::Result<()> {
    println!("{category}");
    library.walk(category, |node, depth| {
        let indent = "  ".repeat(depth + 1);
        match node.kind {
            NodeKind::Folder => println!("{indent}{}/", node.name),
            NodeKind::File => {
                let runtime = node.runtime.as_deref().unwrap_or("-");
                println!("{indent}[{}] {} ({runtime})", node.id, node.name);
                if let Some(description) = &node.description {
                    println!("{indent}    {description}");
                }
            }
        }
    })?;
    Ok(())
}
