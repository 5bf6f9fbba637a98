//! Lexical module resolution
//!
//! Canonical module ids are `./`-prefixed, `/`-separated paths relative to the
//! build context directory. Resolution never touches the filesystem: an id is
//! purely a function of the importing module's id and the raw specifier, so
//! two specifiers naming the same file always produce the same id.

use std::path::{Component, Path, PathBuf};

use log::trace;

use crate::{
    error::{BundleError, Result},
    graph::ModuleId,
};

#[derive(Debug, Clone)]
pub struct ModuleResolver {
    /// Directory every module id is relative to
    context: PathBuf,
}

impl ModuleResolver {
    pub fn new(context: impl Into<PathBuf>) -> Self {
        Self {
            context: context.into(),
        }
    }

    pub fn context(&self) -> &Path {
        &self.context
    }

    /// Map the configured entry path onto its canonical id
    ///
    /// Relative entries are taken relative to the context. Absolute entries
    /// must live inside the context directory.
    pub fn entry_id(&self, entry: &Path) -> Result<ModuleId> {
        let relative = if entry.is_absolute() {
            entry.strip_prefix(&self.context).map_err(|_| {
                BundleError::configuration(format!(
                    "entry `{}` is outside the context directory `{}`",
                    entry.display(),
                    self.context.display()
                ))
            })?
        } else {
            entry
        };

        let mut segments: Vec<String> = Vec::new();
        for component in relative.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => push_parent(&mut segments),
                Component::Normal(part) => segments.push(part.to_string_lossy().into_owned()),
                Component::RootDir | Component::Prefix(_) => {
                    return Err(BundleError::configuration(format!(
                        "entry `{}` cannot be expressed relative to the context",
                        entry.display()
                    )));
                }
            }
        }

        if segments.is_empty() || segments.last().is_some_and(|s| s == "..") {
            return Err(BundleError::configuration(format!(
                "entry `{}` does not name a file",
                entry.display()
            )));
        }

        Ok(id_from_segments(&segments))
    }

    /// Resolve `specifier` as written in `importer` to a canonical id
    pub fn resolve(&self, importer: &ModuleId, specifier: &str) -> Result<ModuleId> {
        let unsupported = |reason: &str| BundleError::Resolution {
            importer: importer.to_string(),
            specifier: specifier.to_owned(),
            reason: reason.to_owned(),
        };

        if !is_relative_specifier(specifier) {
            return Err(unsupported(
                "only relative specifiers starting with `./` or `../` are supported",
            ));
        }
        if specifier.ends_with('/') || specifier.ends_with("/.") || specifier.ends_with("/..") {
            return Err(unsupported(
                "specifier names a directory; imports must name a file explicitly",
            ));
        }

        // Start from the importer's directory
        let mut segments = importer.segments();
        segments.pop();

        for part in specifier.split('/') {
            match part {
                "" | "." => {}
                ".." => push_parent(&mut segments),
                other => segments.push(other.to_owned()),
            }
        }

        if segments.is_empty() {
            return Err(unsupported("specifier resolves to the context directory"));
        }

        let id = id_from_segments(&segments);
        trace!("Resolved `{specifier}` from {importer} to {id}");
        Ok(id)
    }

    /// Location on disk of the module with the given id
    pub fn file_path(&self, id: &ModuleId) -> PathBuf {
        id.segments()
            .iter()
            .fold(self.context.clone(), |path, part| path.join(part))
    }
}

fn is_relative_specifier(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../")
}

/// Pop a directory, or record that the path climbs above the context
fn push_parent(segments: &mut Vec<String>) {
    match segments.last() {
        Some(last) if last != ".." => {
            segments.pop();
        }
        _ => segments.push("..".to_owned()),
    }
}

fn id_from_segments(segments: &[String]) -> ModuleId {
    let joined = segments.join("/");
    if segments.first().is_some_and(|s| s == "..") {
        ModuleId::new(joined)
    } else {
        ModuleId::new(format!("./{joined}"))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn resolver() -> ModuleResolver {
        ModuleResolver::new("/project")
    }

    #[test]
    fn test_sibling_and_nested_specifiers() -> Result<()> {
        let importer = ModuleId::new("./src/index.js");
        assert_eq!(
            resolver().resolve(&importer, "./b.js")?.as_str(),
            "./src/b.js"
        );
        assert_eq!(
            resolver().resolve(&importer, "./lib/util.js")?.as_str(),
            "./src/lib/util.js"
        );
        assert_eq!(
            resolver().resolve(&importer, "../shared/x.js")?.as_str(),
            "./shared/x.js"
        );
        Ok(())
    }

    #[test]
    fn test_equivalent_specifiers_share_an_id() -> Result<()> {
        let a = ModuleId::new("./src/a.js");
        let b = ModuleId::new("./src/nested/b.js");
        let from_a = resolver().resolve(&a, "./common/c.js")?;
        let from_b = resolver().resolve(&b, "../common/./c.js")?;
        let roundabout = resolver().resolve(&a, "./nested/../common//c.js")?;
        assert_eq!(from_a, from_b);
        assert_eq!(from_a, roundabout);
        Ok(())
    }

    #[test]
    fn test_escaping_the_context_keeps_parent_segments() -> Result<()> {
        let importer = ModuleId::new("./index.js");
        assert_eq!(
            resolver().resolve(&importer, "../vendor/x.js")?.as_str(),
            "../vendor/x.js"
        );
        let outside = ModuleId::new("../vendor/x.js");
        assert_eq!(
            resolver().resolve(&outside, "../../y.js")?.as_str(),
            "../../y.js"
        );
        assert_eq!(
            resolver().resolve(&outside, "./z.js")?.as_str(),
            "../vendor/z.js"
        );
        Ok(())
    }

    #[test]
    fn test_bare_and_absolute_specifiers_are_rejected() {
        let importer = ModuleId::new("./src/index.js");
        for specifier in ["lodash", "/abs/path.js", "https://cdn/x.js", "src/b.js"] {
            let err = resolver()
                .resolve(&importer, specifier)
                .expect_err("specifier should be rejected");
            assert_eq!(err.kind(), "ResolutionError", "{specifier}");
        }
    }

    #[test]
    fn test_directory_specifiers_are_rejected() {
        let importer = ModuleId::new("./src/index.js");
        for specifier in ["./", "./lib/", "../", "./lib/.."] {
            assert!(resolver().resolve(&importer, specifier).is_err(), "{specifier}");
        }
    }

    #[test]
    fn test_entry_id_normalisation() -> Result<()> {
        let resolver = resolver();
        assert_eq!(
            resolver.entry_id(Path::new("./src/index.js"))?.as_str(),
            "./src/index.js"
        );
        assert_eq!(
            resolver.entry_id(Path::new("src/../main.js"))?.as_str(),
            "./main.js"
        );
        assert_eq!(
            resolver
                .entry_id(Path::new("/project/src/index.js"))?
                .as_str(),
            "./src/index.js"
        );
        assert!(resolver.entry_id(Path::new("/elsewhere/index.js")).is_err());
        assert!(resolver.entry_id(Path::new("src/..")).is_err());
        Ok(())
    }

    #[test]
    fn test_file_path_round_trips_through_context() {
        let resolver = resolver();
        assert_eq!(
            resolver.file_path(&ModuleId::new("./src/b.js")),
            PathBuf::from("/project/src/b.js")
        );
        assert_eq!(
            resolver.file_path(&ModuleId::new("../vendor/x.js")),
            PathBuf::from("/project/../vendor/x.js")
        );
    }
}
