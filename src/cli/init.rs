//! stageboard init command implementation
//!
//! Creates the initial config file and the file store's data directory.

use std::path::{Path, PathBuf};

use super::Context;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::output::{emit_success, HumanOutput};

#[derive(serde::Serialize)]
struct InitReport {
    root: PathBuf,
    config: PathBuf,
    data_dir: PathBuf,
    created: InitCreated,
}

#[derive(serde::Serialize)]
struct InitCreated {
    config: bool,
    data_dir: bool,
}

pub fn run(ctx: &Context) -> Result<()> {
    ensure_dir(&ctx.root)?;
    let config_path = Config::path_for(&ctx.root);
    let created_config = ensure_config(&config_path, &ctx.config)?;
    let data_dir = ctx.config.store.data_dir(&ctx.root);
    let created_data_dir = ensure_dir(&data_dir)?;

    let report = InitReport {
        root: ctx.root.clone(),
        config: config_path,
        data_dir: data_dir.clone(),
        created: InitCreated {
            config: created_config,
            data_dir: created_data_dir,
        },
    };

    let mut created_items = Vec::new();
    if created_config {
        created_items.push(crate::config::CONFIG_FILE.to_string());
    }
    if created_data_dir {
        created_items.push(format!("{}/", ctx.config.store.dir.trim()));
    }

    let header = if created_items.is_empty() {
        "stageboard init: nothing to do".to_string()
    } else {
        "stageboard init: initialized board".to_string()
    };

    let mut human = HumanOutput::new(header);
    human.push_summary("root", ctx.root.display().to_string());
    human.push_summary("data", data_dir.display().to_string());
    human.push_summary(
        "created",
        if created_items.is_empty() {
            "none".to_string()
        } else {
            created_items.join(", ")
        },
    );
    human.push_next_step("stageboard stage add <id> --title <title>");
    human.push_next_step("stageboard task add <title> --stage <id>");

    emit_success(ctx.output, "init", &report, Some(&human))?;

    Ok(())
}

fn ensure_config(config_path: &Path, config: &Config) -> Result<bool> {
    if config_path.exists() {
        if !config_path.is_file() {
            return Err(Error::OperationFailed(format!(
                "{} exists but is not a file",
                config_path.display()
            )));
        }
        return Ok(false);
    }

    config.save(config_path)?;
    Ok(true)
}

fn ensure_dir(path: &Path) -> Result<bool> {
    if path.exists() {
        if !path.is_dir() {
            return Err(Error::OperationFailed(format!(
                "Expected directory at {}",
                path.display()
            )));
        }
        return Ok(false);
    }

    std::fs::create_dir_all(path)?;
    Ok(true)
}
