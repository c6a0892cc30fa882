//! Named shader programs built from the config manifest
//!
//! Each `[[shader]]` entry becomes one [`GlShader`]. Source files can be
//! watched with [`ShaderWatcher`] and rebuilt in place with
//! [`ShaderLibrary::reload`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use anyhow::{bail, Context, Result};
use log::{info, warn};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};

use super::api::GlApi;
use super::shader::{GlShader, ShaderOptions};
use crate::config::{Config, ShaderConfig};

struct Entry<A: GlApi> {
    config: ShaderConfig,
    shader: GlShader<A>,
}

/// Shader programs by name
pub struct ShaderLibrary<A: GlApi> {
    base_dir: PathBuf,
    options: ShaderOptions,
    entries: BTreeMap<String, Entry<A>>,
}

impl<A: GlApi> ShaderLibrary<A> {
    /// Build every program of `config`, resolving paths against `base_dir`
    ///
    /// Fails on the first program that does not build; programs built
    /// before it are freed again.
    pub fn load(gl: &A, config: &Config, base_dir: &Path) -> Result<Self> {
        let mut library = Self {
            base_dir: base_dir.to_path_buf(),
            options: config.shader_options(),
            entries: BTreeMap::new(),
        };

        for shader_config in &config.shaders {
            if let Err(e) = library.add(gl, shader_config.clone()) {
                library.free(gl);
                return Err(e);
            }
        }

        info!(
            "Shader library loaded: {} programs from {}",
            library.entries.len(),
            base_dir.display()
        );
        Ok(library)
    }

    fn add(&mut self, gl: &A, config: ShaderConfig) -> Result<()> {
        if config.name.is_empty() {
            bail!("Shader entry without a name (vertex: {})", config.vertex.display());
        }
        if self.entries.contains_key(&config.name) {
            bail!("Duplicate shader name \"{}\"", config.name);
        }

        let shader = self.build(gl, &config)?;
        self.entries
            .insert(config.name.clone(), Entry { config, shader });
        Ok(())
    }

    fn build(&self, gl: &A, config: &ShaderConfig) -> Result<GlShader<A>> {
        let mut shader = GlShader::with_options(self.options);
        for (key, value) in &config.defines {
            shader.define(key, value);
        }

        let geometry = config.geometry.as_ref().map(|p| self.base_dir.join(p));
        shader
            .init_from_files(
                gl,
                &config.name,
                &self.base_dir.join(&config.vertex),
                &self.base_dir.join(&config.fragment),
                geometry.as_deref(),
            )
            .with_context(|| format!("Failed to build shader \"{}\"", config.name))?;
        Ok(shader)
    }

    pub fn get(&self, name: &str) -> Option<&GlShader<A>> {
        self.entries.get(name).map(|entry| &entry.shader)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut GlShader<A>> {
        self.entries.get_mut(name).map(|entry| &mut entry.shader)
    }

    /// Program names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every source file the library reads
    pub fn source_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        for entry in self.entries.values() {
            let config = &entry.config;
            paths.push(self.base_dir.join(&config.vertex));
            paths.push(self.base_dir.join(&config.fragment));
            if let Some(geometry) = &config.geometry {
                paths.push(self.base_dir.join(geometry));
            }
        }
        paths
    }

    /// Start watching every source file of the library
    pub fn watch(&self) -> Result<ShaderWatcher> {
        ShaderWatcher::new(&self.source_paths())
    }

    /// Rebuild every program from disk
    ///
    /// A program is replaced only when its rebuild succeeds; on failure the
    /// previous program stays live. Attribute buffers of a replaced program
    /// are released and must be uploaded again.
    /// Returns the number of programs replaced.
    pub fn reload(&mut self, gl: &A) -> usize {
        let mut reloaded = 0;
        let names: Vec<String> = self.entries.keys().cloned().collect();

        for name in names {
            let Some(entry) = self.entries.get(&name) else {
                continue;
            };
            match self.build(gl, &entry.config) {
                Ok(fresh) => {
                    if let Some(entry) = self.entries.get_mut(&name) {
                        let mut old = std::mem::replace(&mut entry.shader, fresh);
                        old.free(gl);
                        reloaded += 1;
                    }
                }
                Err(e) => {
                    warn!("Keeping previous program: {:#}", e);
                }
            }
        }

        info!("Shaders reloaded: {}/{}", reloaded, self.entries.len());
        reloaded
    }

    /// Free every program
    pub fn free(&mut self, gl: &A) {
        for entry in self.entries.values_mut() {
            entry.shader.free(gl);
        }
        self.entries.clear();
    }
}

/// Shader source change watcher
pub struct ShaderWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<()>,
}

impl ShaderWatcher {
    /// Start watching the given source files
    pub fn new(paths: &[PathBuf]) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let watched: Vec<PathBuf> = paths.iter().map(|p| watch_key(p)).collect();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                // Editors often save by writing a temp file then renaming it
                use notify::EventKind;
                match event.kind {
                    EventKind::Modify(_) | EventKind::Create(_) => {
                        if event.paths.iter().any(|p| is_watched(&watched, p)) {
                            let _ = tx.send(());
                        }
                    }
                    _ => {}
                }
            }
        })?;

        // Watch parent directories to catch rename operations
        let mut dirs: Vec<&Path> = paths
            .iter()
            .map(|p| match p.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => dir,
                _ => Path::new("."),
            })
            .collect();
        dirs.sort();
        dirs.dedup();
        for dir in dirs {
            watcher
                .watch(dir, RecursiveMode::NonRecursive)
                .with_context(|| format!("Failed to watch {}", dir.display()))?;
        }

        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    /// Check if a watched file was modified (non-blocking)
    ///
    /// Drains pending events so a burst of writes reports once.
    pub fn check_reload(&self) -> bool {
        let mut changed = false;
        while self.rx.try_recv().is_ok() {
            changed = true;
        }
        changed
    }
}

/// Comparable form of a path (canonical when it exists)
fn watch_key(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn is_watched(watched: &[PathBuf], path: &Path) -> bool {
    let path = watch_key(path);
    watched.iter().any(|w| *w == path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_matches_full_path() {
        let root = std::env::temp_dir().join(format!("glkit-watch-key-{}", std::process::id()));
        let (a, b) = (root.join("a"), root.join("b"));
        std::fs::create_dir_all(&a).unwrap();
        std::fs::create_dir_all(&b).unwrap();
        std::fs::write(a.join("mesh.vert"), "").unwrap();
        std::fs::write(b.join("mesh.vert"), "").unwrap();

        let watched = vec![watch_key(&a.join("mesh.vert"))];
        assert!(is_watched(&watched, &a.join("mesh.vert")));
        assert!(is_watched(&watched, &a.join(".").join("mesh.vert")));
        assert!(!is_watched(&watched, &b.join("mesh.vert")));
        assert!(!is_watched(&watched, &a.join("mesh.vert~")));

        std::fs::remove_dir_all(&root).unwrap();
    }
}
