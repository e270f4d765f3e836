use super::utils::Session;
use colored::Colorize;
use std::collections::BTreeMap;
use winsetup::error::Result;
use winsetup::{ApplicationSpec, InstallerKind};

/// Print the catalog grouped by category.
pub fn list(session: &Session) -> Result<()> {
    let mut by_category: BTreeMap<&str, Vec<&ApplicationSpec>> = BTreeMap::new();
    for app in &session.catalog.applications {
        by_category
            .entry(app.category.as_deref().unwrap_or("Other"))
            .or_default()
            .push(app);
    }

    for (category, apps) in by_category {
        println!("{}", format!("==> {}", category).bold().green());
        for app in apps {
            println!("  {:<24} {}", app.name, describe_methods(app).dimmed());
        }
        println!();
    }

    let catalog = &session.catalog;
    println!(
        "{} applications, {} services, {} tweaks, {} bloatware patterns",
        catalog.applications.len().to_string().bold(),
        catalog.services.len(),
        catalog.registry_tweaks.len(),
        catalog.bloatware.len()
    );
    Ok(())
}

fn describe_methods(app: &ApplicationSpec) -> String {
    let mut methods = Vec::new();
    if let Some(id) = &app.package_manager_id {
        methods.push(format!("winget: {}", id));
    }
    if let Some(download) = &app.direct_download {
        let kind = match download.installer_kind() {
            Some(InstallerKind::Exe) => "exe",
            Some(InstallerKind::Msi) => "msi",
            Some(InstallerKind::MsixBundle) => "msixbundle",
            None => "unsupported",
        };
        methods.push(format!("direct: {}", kind));
    }
    methods.join(", ")
}
