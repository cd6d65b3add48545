//! Minimal `.gitmodules` reader/writer.
//!
//! Subtree embedding copies a source's `.gitmodules` into a sub-directory,
//! where git no longer reads it. [`fold_nested`] merges those nested files
//! into the root file with prefixed names and paths.

/// One `[submodule "<name>"]` section. Keys keep their file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmoduleEntry {
    pub name: String,
    pub settings: Vec<(String, String)>,
}

impl SubmoduleEntry {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.settings
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn set(&mut self, key: &str, value: String) {
        match self.settings.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.settings.push((key.to_string(), value)),
        }
    }
}

/// Parse the subset of git-config syntax `.gitmodules` files use.
/// Sections other than `submodule` and malformed lines are skipped.
pub fn parse(contents: &str) -> Vec<SubmoduleEntry> {
    let mut entries: Vec<SubmoduleEntry> = Vec::new();
    let mut in_submodule = false;

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_submodule = false;
            if let Some(rest) = header.trim().strip_prefix("submodule") {
                let name = rest.trim().trim_matches('"');
                if !name.is_empty() {
                    entries.push(SubmoduleEntry {
                        name: name.to_string(),
                        settings: Vec::new(),
                    });
                    in_submodule = true;
                }
            }
            continue;
        }
        if !in_submodule {
            continue;
        }
        if let (Some((key, value)), Some(entry)) = (line.split_once('='), entries.last_mut()) {
            let value = value.trim().trim_matches('"').to_string();
            entry.set(key.trim(), value);
        }
    }
    entries
}

pub fn render(entries: &[SubmoduleEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&format!("[submodule \"{}\"]\n", entry.name));
        for (key, value) in &entry.settings {
            out.push_str(&format!("\t{key} = {value}\n"));
        }
    }
    out
}

/// Merge nested `.gitmodules` files into the root file.
///
/// `nested` holds `(directory, contents)` pairs, directory relative to the
/// repository root. Nested names become `<dir with '/' -> '_'>_<name>` and
/// paths are prefixed with the directory. Entries already present in `root`
/// under the same name are replaced, so folding twice is stable.
pub fn fold_nested(root: Option<&str>, nested: &[(String, String)]) -> String {
    let mut merged = root.map(parse).unwrap_or_default();

    for (dir, contents) in nested {
        let dir = dir.trim_matches('/');
        for mut entry in parse(contents) {
            let Some(path) = entry.get("path").map(|p| p.replace('\\', "/")) else {
                continue;
            };
            entry.name = format!("{}_{}", dir.replace('/', "_"), entry.name);
            entry.set("path", format!("{dir}/{}", path.trim_matches('/')));
            match merged.iter_mut().find(|e| e.name == entry.name) {
                Some(existing) => *existing = entry,
                None => merged.push(entry),
            }
        }
    }
    render(&merged)
}
