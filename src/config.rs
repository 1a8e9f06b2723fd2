use std::path::Path;

use anyhow::anyhow;
use config::{Config, File};
use serde::Deserialize;

use crate::paths::Boundary;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Document extensions without the dot, in resolution order
    pub extensions: Vec<String>,
    /// Directory levels below the root to scan; `None` scans everything
    #[serde(default)]
    pub scan_depth: Option<usize>,
    /// Skip dot-files and dot-directories while scanning
    pub ignore_hidden: bool,
    /// Whether links inside fenced code blocks count as graph edges and get rewritten
    pub references_in_codeblocks: bool,
    pub max_inclusion_depth: usize,
    /// Directory levels the resolver searches around the referencing document; 0 disables
    pub search_depth: usize,
    /// Keep neighbourhood searches and symlinked documents inside the home directory
    pub enforce_home_boundary: bool,
    pub event_capacity: usize,
}

impl Settings {
    pub fn new(root_dir: &Path) -> anyhow::Result<Settings> {
        let expanded = shellexpand::tilde("~/.config/notegraph/settings");
        let settings = Config::builder()
            .add_source(File::with_name(&expanded).required(false))
            .add_source(
                File::with_name(&format!(
                    "{}/.notegraph",
                    root_dir
                        .to_str()
                        .ok_or(anyhow!("Can't convert root_dir to str"))?
                ))
                .required(false),
            )
            .set_default("extensions", vec!["md", "markdown"])?
            .set_default("ignore_hidden", true)?
            .set_default("references_in_codeblocks", true)?
            .set_default("max_inclusion_depth", 32_i64)?
            .set_default("search_depth", 0_i64)?
            .set_default("enforce_home_boundary", true)?
            .set_default("event_capacity", 64_i64)?
            .build()
            .map_err(|err| anyhow!("Build err: {err}"))?;

        let settings = settings.try_deserialize::<Settings>()?;

        anyhow::Ok(settings)
    }

    /// The home directory when `enforce_home_boundary` is on and home is known.
    pub fn home_boundary(&self) -> Option<Boundary> {
        if self.enforce_home_boundary {
            Boundary::home()
        } else {
            None
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            extensions: vec!["md".to_string(), "markdown".to_string()],
            scan_depth: None,
            ignore_hidden: true,
            references_in_codeblocks: true,
            max_inclusion_depth: 32,
            search_depth: 0,
            enforce_home_boundary: true,
            event_capacity: 64,
        }
    }
}
