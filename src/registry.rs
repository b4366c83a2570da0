use std::{collections::HashMap, sync::Arc};
use tracing::debug;

use crate::{definition::BeanDefinition, errors::RegistrationErrorKind};

/// Supplier of raw bean definitions, consulted for every name the container resolves.
pub trait DefinitionSource {
    #[must_use]
    fn definition(&self, name: &str) -> Option<Arc<BeanDefinition>>;

    /// All known names in registration order
    #[must_use]
    fn definition_names(&self) -> Vec<String>;
}

/// Bean definition store: definitions by name plus aliases of those names.
pub struct Registry {
    names: Vec<String>,
    definitions: HashMap<String, Arc<BeanDefinition>>,
    aliases: HashMap<String, String>,
    allow_overriding: bool,
    frozen: bool,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            names: Vec::new(),
            definitions: HashMap::new(),
            aliases: HashMap::new(),
            allow_overriding: true,
            frozen: false,
        }
    }

    /// Adds a definition, replacing one registered under the same name
    #[inline]
    #[must_use]
    pub fn provide(mut self, name: impl Into<String>, definition: BeanDefinition) -> Self {
        self.insert(name.into(), definition);
        self
    }

    /// Registers the definition under `name`.
    /// Returns the definition it replaced, if any.
    ///
    /// # Errors
    /// - Returns [`RegistrationErrorKind::Frozen`] if the configuration is frozen
    /// - Returns [`RegistrationErrorKind::DefinitionOverride`] if the name is taken and overriding is disabled
    pub fn register_definition(
        &mut self,
        name: impl Into<String>,
        definition: BeanDefinition,
    ) -> Result<Option<Arc<BeanDefinition>>, RegistrationErrorKind> {
        let name = name.into();
        if self.frozen {
            return Err(RegistrationErrorKind::Frozen { name });
        }
        if !self.allow_overriding && self.definitions.contains_key(&name) {
            return Err(RegistrationErrorKind::DefinitionOverride { name });
        }
        Ok(self.insert(name, definition))
    }

    /// # Errors
    /// Returns [`RegistrationErrorKind::Frozen`] if the configuration is frozen
    pub fn remove_definition(&mut self, name: &str) -> Result<Option<Arc<BeanDefinition>>, RegistrationErrorKind> {
        if self.frozen {
            return Err(RegistrationErrorKind::Frozen { name: name.to_owned() });
        }
        let removed = self.definitions.remove(name);
        if removed.is_some() {
            self.names.retain(|registered| registered != name);
            debug!(name, "Definition removed");
        }
        Ok(removed)
    }

    /// Registers `alias` as another name of `name`.
    /// An alias equal to the name removes the alias instead.
    ///
    /// # Errors
    /// - Returns [`RegistrationErrorKind::AliasOverride`] if the alias points to another name and overriding is disabled
    /// - Returns [`RegistrationErrorKind::AliasCycle`] if `name` already resolves through `alias`
    pub fn register_alias(&mut self, name: impl Into<String>, alias: impl Into<String>) -> Result<(), RegistrationErrorKind> {
        let (name, alias) = (name.into(), alias.into());
        if name == alias {
            self.aliases.remove(&alias);
            return Ok(());
        }
        if let Some(existing) = self.aliases.get(&alias) {
            if *existing == name {
                return Ok(());
            }
            if !self.allow_overriding {
                return Err(RegistrationErrorKind::AliasOverride {
                    alias,
                    existing: existing.clone(),
                });
            }
        }
        if self.resolves_through(&name, &alias) {
            return Err(RegistrationErrorKind::AliasCycle { name, alias });
        }

        debug!(%name, %alias, "Alias registered");
        self.aliases.insert(alias, name);
        Ok(())
    }

    /// Resolves an alias chain to the name it ends at
    #[must_use]
    pub fn canonical_name<'a>(&'a self, name: &'a str) -> &'a str {
        let mut canonical = name;
        while let Some(target) = self.aliases.get(canonical) {
            canonical = target;
        }
        canonical
    }

    /// All aliases resolving to `name`, directly or through other aliases
    #[must_use]
    pub fn aliases(&self, name: &str) -> Vec<String> {
        let canonical = self.canonical_name(name);
        let mut aliases: Vec<_> = self
            .aliases
            .keys()
            .filter(|alias| alias.as_str() != name && self.canonical_name(alias) == canonical)
            .cloned()
            .collect();
        aliases.sort_unstable();
        aliases
    }

    #[inline]
    #[must_use]
    pub fn is_alias(&self, name: &str) -> bool {
        self.aliases.contains_key(name)
    }

    #[inline]
    #[must_use]
    pub fn contains_definition(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Forbids further registrations and removals
    #[inline]
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    #[inline]
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    #[inline]
    pub(crate) fn set_allow_overriding(&mut self, allow_overriding: bool) {
        self.allow_overriding = allow_overriding;
    }
}

impl Registry {
    fn insert(&mut self, name: String, definition: BeanDefinition) -> Option<Arc<BeanDefinition>> {
        // A definition hides an alias of the same name
        self.aliases.remove(&name);

        let replaced = self.definitions.insert(name.clone(), Arc::new(definition));
        if replaced.is_some() {
            debug!(%name, "Definition replaced");
        } else {
            self.names.push(name);
        }
        replaced
    }

    fn resolves_through(&self, name: &str, alias: &str) -> bool {
        let mut current = name;
        while let Some(target) = self.aliases.get(current) {
            if target == alias {
                return true;
            }
            current = target;
        }
        current == alias
    }
}

impl DefinitionSource for Registry {
    #[inline]
    fn definition(&self, name: &str) -> Option<Arc<BeanDefinition>> {
        self.definitions.get(name).cloned()
    }

    #[inline]
    fn definition_names(&self) -> Vec<String> {
        self.names.clone()
    }
}
