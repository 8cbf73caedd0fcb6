//! Providers command - list installed provider manifests.

use std::path::PathBuf;

use geomaster::descriptor::{scan_manifests, ProviderDescriptor};

use crate::error::CliError;
use crate::runner::{load_config, GlobalOptions};

/// Arguments for the providers command.
#[derive(Debug, Default)]
pub struct ProvidersArgs {
    /// Manifest directory overriding the configured one
    pub directory: Option<PathBuf>,
    /// Print JSON instead of a table
    pub json: bool,
}

/// Run the providers command.
///
/// Malformed manifests are skipped by the scanner with a warning in the log.
pub fn run(options: &GlobalOptions, args: ProvidersArgs) -> Result<(), CliError> {
    let directory = match args.directory {
        Some(dir) => dir,
        None => load_config(options.config.as_deref())?.providers.directory,
    };
    let descriptors = scan_manifests(&directory)?;

    if args.json {
        let json = serde_json::to_string_pretty(&descriptors).map_err(CliError::Output)?;
        println!("{}", json);
        return Ok(());
    }

    if descriptors.is_empty() {
        println!("No providers found in {}", directory.display());
        return Ok(());
    }

    println!("Providers in {}", directory.display());
    println!();
    for descriptor in &descriptors {
        print!("{}", describe(descriptor));
    }
    Ok(())
}

fn describe(desc: &ProviderDescriptor) -> String {
    let mut out = format!("{}\n", desc.name);
    if !desc.description.is_empty() {
        out.push_str(&format!("  {}\n", desc.description));
    }
    out.push_str(&format!("  Service:    {} {}\n", desc.service, desc.path));
    out.push_str(&format!("  Accuracy:   {}\n", desc.accuracy));
    out.push_str(&format!(
        "  Interfaces: {}\n",
        join_names(desc.interfaces.iter_names().map(|(name, _)| name))
    ));
    out.push_str(&format!(
        "  Requires:   {}\n",
        join_names(desc.requires.iter_names().map(|(name, _)| name))
    ));
    out.push_str(&format!(
        "  Provides:   {}\n",
        join_names(desc.provides.iter_names().map(|(name, _)| name))
    ));
    out.push('\n');
    out
}

fn join_names<'a>(names: impl Iterator<Item = &'a str>) -> String {
    let names: Vec<String> = names.map(|n| n.to_lowercase()).collect();
    if names.is_empty() {
        "-".to_string()
    } else {
        names.join(", ")
    }
}
