//! RON content loader

use crate::error::{Error, Result};
use crate::schema::{self, ContentFile};
use spellbind_core::{AbilityDef, CharacterTemplate, DefinitionSet, EffectDef, RuntimeConfig};
use std::fs;
use std::path::{Path, PathBuf};

/// File stem of the runtime configuration inside a content directory
pub const CONFIG_FILE_STEM: &str = "config";

/// Everything a world needs, validated
#[derive(Debug, Clone, Default)]
pub struct Content {
    pub defs: DefinitionSet,
    pub config: RuntimeConfig,
}

/// Loader for RON content files
#[derive(Debug, Default)]
pub struct Loader {
    defs: DefinitionSet,
    config: Option<RuntimeConfig>,
}

impl Loader {
    /// Create a new loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a single RON file
    ///
    /// A file named `config.ron` is read as the [`RuntimeConfig`]. Other files
    /// are content files; a file holding one bare definition is accepted when
    /// its name says what it is (`*ability*`, `*effect*`, `*character*`).
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let stem = path.file_stem().and_then(|n| n.to_str()).unwrap_or("");

        if stem == CONFIG_FILE_STEM {
            self.load_config_str(&content)?;
            return Ok(0);
        }

        match ron::from_str::<ContentFile>(&content) {
            Ok(file) => self.add_all(file),
            Err(content_err) => {
                let stem = stem.to_ascii_lowercase();
                if stem.contains("abilit") {
                    self.add_ability(ron::from_str(&content)?).map(|_| 1)
                } else if stem.contains("effect") {
                    self.add_effect(ron::from_str(&content)?).map(|_| 1)
                } else if stem.contains("character") {
                    self.add_character(ron::from_str(&content)?).map(|_| 1)
                } else {
                    Err(content_err.into())
                }
            }
        }
    }

    /// Load a content file from a RON string, returning how many definitions it held
    pub fn load_str(&mut self, content: &str) -> Result<usize> {
        let file: ContentFile = ron::from_str(content)?;
        self.add_all(file)
    }

    /// Load the runtime configuration from a RON string
    ///
    /// Missing fields keep their defaults; out-of-range limits are clamped.
    pub fn load_config_str(&mut self, content: &str) -> Result<()> {
        let mut config: RuntimeConfig = ron::from_str(content)?;
        let settle = config.max_settle_passes();
        config.set_max_settle_passes(settle);
        let queued = config.max_queued_activations();
        config.set_max_queued_activations(queued);
        if self.config.replace(config).is_some() {
            tracing::warn!("runtime configuration loaded twice, keeping the last one");
        }
        Ok(())
    }

    /// Load every `.ron` file under a directory, recursively, in name order
    pub fn load_directory(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();

        if !path.is_dir() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Not a directory: {:?}", path),
            )));
        }

        let mut entries = fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<PathBuf>>>()?;
        entries.sort();

        let mut loaded = 0;
        for file_path in entries {
            if file_path.is_dir() {
                loaded += self.load_directory(&file_path)?;
            } else if file_path.extension().is_some_and(|e| e == "ron") {
                let n = self.load_file(&file_path)?;
                tracing::debug!(file = %file_path.display(), definitions = n, "loaded content file");
                loaded += n;
            }
        }
        Ok(loaded)
    }

    pub fn add_ability(&mut self, def: AbilityDef) -> Result<()> {
        schema::check_ability(&def)?;
        if self.defs.has_ability(&def.id) {
            return Err(Error::DuplicateDefinition(format!("ability {}", def.id)));
        }
        self.defs.insert_ability(def);
        Ok(())
    }

    pub fn add_effect(&mut self, def: EffectDef) -> Result<()> {
        schema::check_effect(&def)?;
        if self.defs.has_effect(&def.id) {
            return Err(Error::DuplicateDefinition(format!("effect {}", def.id)));
        }
        self.defs.insert_effect(def);
        Ok(())
    }

    pub fn add_character(&mut self, template: CharacterTemplate) -> Result<()> {
        schema::check_character(&template)?;
        if self.defs.has_character(&template.id) {
            return Err(Error::DuplicateDefinition(format!("character {}", template.id)));
        }
        self.defs.insert_character(template);
        Ok(())
    }

    /// Definitions loaded so far (for inspection during loading)
    pub fn defs(&self) -> &DefinitionSet {
        &self.defs
    }

    /// Check cross references and return the loaded content
    pub fn finish(self) -> Result<Content> {
        if let Some((referrer, kind, id)) = self.defs.unresolved() {
            return Err(Error::MissingReference {
                referrer: referrer.to_string(),
                kind,
                id: id.to_string(),
            });
        }
        tracing::info!(
            abilities = self.defs.abilities().count(),
            effects = self.defs.effects().count(),
            characters = self.defs.characters().count(),
            "content loaded"
        );
        Ok(Content {
            defs: self.defs,
            config: self.config.unwrap_or_default(),
        })
    }

    fn add_all(&mut self, file: ContentFile) -> Result<usize> {
        if file.is_empty() {
            tracing::warn!("content file holds no definitions");
        }
        let mut loaded = 0;
        for def in file.effects {
            self.add_effect(def)?;
            loaded += 1;
        }
        for def in file.abilities {
            self.add_ability(def)?;
            loaded += 1;
        }
        for template in file.characters {
            self.add_character(template)?;
            loaded += 1;
        }
        Ok(loaded)
    }
}
