//! Bidirectional alias ↔ canonical name registry.
//!
//! Built once from an ordered list of `alias -> canonical` pairs and read-only
//! afterwards, so a shared `&AliasRegistry` needs no locking.
//!
//! ```text
//! resolve("YF")            -> "YAHOO_FINANCE"   (alias)
//! resolve("YAHOO_FINANCE") -> "YAHOO_FINANCE"   (canonical, identity)
//! resolve("UNKNOWN")       -> "UNKNOWN"         (passthrough)
//! get_alias("YAHOO_FINANCE") -> Some("YF")
//! ```
//!
//! When built case-insensitive, every alias and canonical name is stored
//! lower-cased and every lookup path lower-cases its input first.

use std::{borrow::Cow, collections::HashMap, fmt, ops::Index};

use crate::error::KitError;

/// Entries shown in the `Display` snippet before eliding the rest.
const DISPLAY_SNIPPET: usize = 3;

/// Construction options for [`AliasRegistry`].
#[derive(Debug, Clone, Copy)]
pub struct AliasOptions {
    /// Compare names exactly. When `false`, names are lower-cased on input
    /// and on every lookup.
    pub case_sensitive: bool,
    /// Skip conflict detection. Later conflicting entries then win.
    pub allow_conflicts: bool,
}

impl Default for AliasOptions {
    fn default() -> Self {
        Self { case_sensitive: true, allow_conflicts: false }
    }
}

pub struct AliasRegistry {
    /// `(alias, canonical)` in declaration order.
    entries: Vec<(String, String)>,
    /// alias -> index into `entries`
    forward: HashMap<String, usize>,
    /// canonical -> alias
    reverse: HashMap<String, String>,
    case_sensitive: bool,
}

impl AliasRegistry {
    /// Case-sensitive registry that rejects conflicting declarations.
    pub fn new<I, K, V>(pairs: I) -> Result<Self, KitError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::with_options(pairs, AliasOptions::default())
    }

    pub fn with_options<I, K, V>(pairs: I, options: AliasOptions) -> Result<Self, KitError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut registry = Self::empty(options);
        for (alias, canonical) in pairs {
            let alias = registry.normalize_owned(alias.into());
            let canonical = registry.normalize_owned(canonical.into());
            if !options.allow_conflicts {
                registry.check_conflict(&alias, &canonical)?;
            }
            registry.insert(alias, canonical, options.allow_conflicts);
        }
        Ok(registry)
    }

    pub fn empty(options: AliasOptions) -> Self {
        Self {
            entries: Vec::new(),
            forward: HashMap::new(),
            reverse: HashMap::new(),
            case_sensitive: options.case_sensitive,
        }
    }

    /// Build from a TOML table of string values, e.g. an `[aliases]` section.
    pub fn from_table(table: &toml::Table, options: AliasOptions) -> Result<Self, KitError> {
        let pairs = table
            .iter()
            .map(|(alias, value)| match value.as_str() {
                Some(canonical) => Ok((alias.clone(), canonical.to_string())),
                None => Err(KitError::Config(format!(
                    "alias '{alias}' must map to a string, got {}",
                    value.type_str()
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::with_options(pairs, options)
    }

    // ── lookups ──────────────────────────────────────────────────────────────

    /// Canonical form of `name`. Known aliases map to their canonical name;
    /// canonical and unknown names pass through (normalized when the
    /// registry is case-insensitive). Never fails.
    pub fn resolve<'a>(&'a self, name: &'a str) -> Cow<'a, str> {
        let key = self.normalize(name);
        match self.forward.get(key.as_ref()) {
            Some(&idx) => Cow::Borrowed(self.entries[idx].1.as_str()),
            None => key,
        }
    }

    /// Reverse lookup: the alias that targets `canonical`, if any.
    pub fn get_alias(&self, canonical: &str) -> Option<&str> {
        self.reverse.get(self.normalize(canonical).as_ref()).map(String::as_str)
    }

    /// Same contract as [`get_alias`](Self::get_alias).
    pub fn resolve_to_alias(&self, canonical: &str) -> Option<&str> {
        self.get_alias(canonical)
    }

    /// Strict lookup restricted to declared aliases.
    pub fn lookup(&self, alias: &str) -> Result<&str, KitError> {
        self.get(alias).ok_or_else(|| KitError::AliasNotFound(alias.to_string()))
    }

    pub fn get(&self, alias: &str) -> Option<&str> {
        self.forward
            .get(self.normalize(alias).as_ref())
            .map(|&idx| self.entries[idx].1.as_str())
    }

    pub fn get_or<'a>(&'a self, alias: &str, default: &'a str) -> &'a str {
        self.get(alias).unwrap_or(default)
    }

    /// `true` if `name` is a declared alias or a canonical target.
    pub fn contains(&self, name: &str) -> bool {
        let key = self.normalize(name);
        self.forward.contains_key(key.as_ref()) || self.reverse.contains_key(key.as_ref())
    }

    pub fn is_alias(&self, name: &str) -> bool {
        self.forward.contains_key(self.normalize(name).as_ref())
    }

    pub fn is_canonical(&self, name: &str) -> bool {
        self.reverse.contains_key(self.normalize(name).as_ref())
    }

    // ── iteration & export ───────────────────────────────────────────────────

    /// `(alias, canonical)` pairs in declaration order.
    pub fn items(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.entries.iter().map(|(a, c)| (a.as_str(), c.as_str()))
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|(a, _)| a.as_str())
    }

    pub fn canonicals(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|(_, c)| c.as_str())
    }

    pub fn to_map(&self) -> HashMap<String, String> {
        self.entries.iter().cloned().collect()
    }

    /// canonical -> alias.
    ///
    /// Lossy: when several aliases share one canonical name only one of them
    /// appears here, the first registered (or the last, for a registry built
    /// with `allow_conflicts`).
    pub fn to_reverse_map(&self) -> HashMap<String, String> {
        self.reverse.clone()
    }

    /// Number of declared aliases.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    // ── internals ────────────────────────────────────────────────────────────

    fn normalize<'a>(&self, name: &'a str) -> Cow<'a, str> {
        if self.case_sensitive {
            Cow::Borrowed(name)
        } else {
            Cow::Owned(name.to_lowercase())
        }
    }

    fn normalize_owned(&self, name: String) -> String {
        if self.case_sensitive { name } else { name.to_lowercase() }
    }

    fn check_conflict(&self, alias: &str, canonical: &str) -> Result<(), KitError> {
        let conflict = |existing: &str, existing_canonical: &str| KitError::AliasConflict {
            alias: alias.to_string(),
            canonical: canonical.to_string(),
            existing: existing.to_string(),
            existing_canonical: existing_canonical.to_string(),
        };

        // Same alias declared twice with different targets.
        if let Some(previous) = self.get(alias) {
            if previous != canonical {
                return Err(conflict(alias, previous));
            }
            return Ok(());
        }
        // The target is itself an alias pointing somewhere else.
        if let Some(target) = self.get(canonical) {
            if target != canonical {
                return Err(conflict(canonical, target));
            }
        }
        // The alias is already somebody's canonical name.
        if alias != canonical {
            if let Some(owner) = self.reverse.get(alias) {
                return Err(conflict(owner, alias));
            }
        }
        Ok(())
    }

    fn insert(&mut self, alias: String, canonical: String, last_wins: bool) {
        match self.forward.get(&alias) {
            Some(&idx) => {
                let previous = std::mem::replace(&mut self.entries[idx].1, canonical.clone());
                if previous != canonical && self.reverse.get(&previous) == Some(&alias) {
                    match self.entries.iter().find(|(a, c)| c == &previous && a != &alias) {
                        Some((other, _)) => {
                            self.reverse.insert(previous, other.clone());
                        }
                        None => {
                            self.reverse.remove(&previous);
                        }
                    }
                }
            }
            None => {
                self.forward.insert(alias.clone(), self.entries.len());
                self.entries.push((alias.clone(), canonical.clone()));
            }
        }

        if last_wins {
            self.reverse.insert(canonical, alias);
        } else {
            self.reverse.entry(canonical).or_insert(alias);
        }
    }
}

impl TryFrom<toml::Table> for AliasRegistry {
    type Error = KitError;

    fn try_from(table: toml::Table) -> Result<Self, Self::Error> {
        Self::from_table(&table, AliasOptions::default())
    }
}

/// Strict indexed access. Panics when `alias` is not declared, like
/// `HashMap`'s `Index`; use [`AliasRegistry::lookup`] to get an error instead.
impl Index<&str> for AliasRegistry {
    type Output = str;

    fn index(&self, alias: &str) -> &str {
        match self.get(alias) {
            Some(canonical) => canonical,
            None => panic!("alias not found: '{alias}'"),
        }
    }
}

impl fmt::Debug for AliasRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AliasRegistry ")?;
        f.debug_map().entries(self.items()).finish()
    }
}

impl fmt::Display for AliasRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AliasRegistry({} mappings", self.len())?;
        for (i, (alias, canonical)) in self.items().take(DISPLAY_SNIPPET).enumerate() {
            let sep = if i == 0 { ": " } else { ", " };
            write!(f, "{sep}{alias} -> {canonical}")?;
        }
        if self.len() > DISPLAY_SNIPPET {
            f.write_str(", ...")?;
        }
        f.write_str(")")
    }
}
