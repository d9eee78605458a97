//! # Config Prefabs for Well-Known Model Configurations
//!
//! A prefab is a named config builder, with an optional directory
//! of pretrained weights compatible with the config.
//!
//! Prefab lookups accept ``"{prefab}"`` or ``"{prefab}.{weights}"`` names.

use crate::cache::weights::{
    PretrainedWeightsDescriptor, PretrainedWeightsMap, StaticPretrainedWeightsMap,
};
use anyhow::bail;
use burn::config::Config;
use std::fmt::Debug;
use std::sync::Arc;

/// Split a ``"{prefab}.{weights}"`` name.
///
/// # Returns
///
/// ``(prefab, Some(weights))``, or ``(name, None)`` if there is no ``'.'``.
pub fn split_prefab_name(name: &str) -> (&str, Option<&str>) {
    match name.split_once('.') {
        Some((prefab, weights)) => (prefab, Some(weights)),
        None => (name, None),
    }
}

/// Static builder for a [`PreFabConfig`]
pub struct StaticPreFabConfig<C>
where
    C: 'static + Config + Debug + Clone,
{
    /// Name of the model config pre-fab.
    pub name: &'static str,

    /// Description of the model config pre-fab.
    pub description: &'static str,

    /// Builder function for the config.
    pub builder: fn() -> C,

    /// Pretrained weights compatible with the config.
    pub weights: Option<&'static StaticPretrainedWeightsMap<'static>>,
}

impl<C> StaticPreFabConfig<C>
where
    C: 'static + Config + Debug + Clone,
{
    /// Convert to a [`PreFabConfig<C>`].
    pub fn to_prefab(&self) -> PreFabConfig<C> {
        let builder = self.builder;
        PreFabConfig {
            name: self.name.to_string(),
            description: self.description.to_string(),
            builder: Arc::new(builder),
            weights: self.weights.map(|w| w.to_directory()),
        }
    }
}

impl<C> From<&StaticPreFabConfig<C>> for PreFabConfig<C>
where
    C: 'static + Config + Debug + Clone,
{
    fn from(config: &StaticPreFabConfig<C>) -> Self {
        config.to_prefab()
    }
}

impl<C> Debug for StaticPreFabConfig<C>
where
    C: 'static + Config + Debug + Clone,
{
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        self.to_prefab().fmt(f)
    }
}

/// A [`Config`] Well-Known Pre-Fab.
#[derive(Clone)]
pub struct PreFabConfig<C>
where
    C: 'static + Config + Debug + Clone,
{
    /// Name of the model config pre-fab.
    pub name: String,

    /// Description of the model config pre-fab.
    pub description: String,

    /// Builder function for the config.
    pub builder: Arc<dyn Fn() -> C + Send + Sync>,

    /// Pretrained weights compatible with the config.
    pub weights: Option<PretrainedWeightsMap>,
}

impl<C> Debug for PreFabConfig<C>
where
    C: 'static + Config + Debug + Clone,
{
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let pretty = f.alternate();

        let type_name = std::any::type_name::<C>();
        let mut handle = f.debug_struct(&format!("PreFabConfig<{type_name}>"));

        handle
            .field("name", &self.name)
            .field("description", &self.description)
            .field(
                "weights",
                &self
                    .weights
                    .as_ref()
                    .map(|w| w.items.keys().cloned().collect::<Vec<_>>()),
            );

        if pretty {
            handle.field("config", &self.to_config());
        }

        handle.finish()
    }
}

impl<C> PreFabConfig<C>
where
    C: 'static + Config + Debug + Clone,
{
    /// Build a new config.
    pub fn to_config(&self) -> C {
        (self.builder)()
    }

    /// Lookup a pretrained weights descriptor by name.
    pub fn lookup_pretrained_weights(
        &self,
        name: &str,
    ) -> Option<PretrainedWeightsDescriptor> {
        self.weights.as_ref()?.lookup_by_name(name)
    }

    /// Lookup a pretrained weights descriptor by name.
    pub fn try_lookup_pretrained_weights(
        &self,
        name: &str,
    ) -> anyhow::Result<PretrainedWeightsDescriptor> {
        match self.lookup_pretrained_weights(name) {
            Some(d) => Ok(d),
            None => bail!("Prefab \"{}\" has no pretrained weights: {}", self.name, name),
        }
    }

    /// Lookup a pretrained weights descriptor by name.
    ///
    /// # Panics
    ///
    /// If the weights are not found.
    pub fn expect_lookup_pretrained_weights(
        &self,
        name: &str,
    ) -> PretrainedWeightsDescriptor {
        match self.try_lookup_pretrained_weights(name) {
            Ok(d) => d,
            Err(e) => panic!("{e}"),
        }
    }
}

/// Static directory of [`StaticPreFabConfig`]s.
#[derive(Debug)]
pub struct StaticPreFabMap<C>
where
    C: 'static + Config + Debug + Clone,
{
    /// Name of the directory.
    pub name: &'static str,

    /// Description of the directory.
    pub description: &'static str,

    /// The prefabs.
    pub items: &'static [&'static StaticPreFabConfig<C>],
}

impl<C> StaticPreFabMap<C>
where
    C: 'static + Config + Debug + Clone,
{
    /// Names of the prefabs, in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.items.iter().map(|p| p.name).collect()
    }

    /// Lookup a prefab by name.
    ///
    /// A ``"{prefab}.{weights}"`` name is resolved to its prefab.
    pub fn lookup_prefab(
        &self,
        name: &str,
    ) -> Option<PreFabConfig<C>> {
        let (prefab, _) = split_prefab_name(name);
        self.items
            .iter()
            .find(|p| p.name == prefab)
            .map(|p| p.to_prefab())
    }

    /// Lookup a prefab by name.
    pub fn try_lookup_prefab(
        &self,
        name: &str,
    ) -> anyhow::Result<PreFabConfig<C>> {
        match self.lookup_prefab(name) {
            Some(p) => Ok(p),
            None => bail!(
                "Unknown {} prefab: \"{}\". Options are {:?}",
                self.name,
                name,
                self.names()
            ),
        }
    }

    /// Lookup a prefab by name.
    ///
    /// # Panics
    ///
    /// If the prefab is not found.
    pub fn expect_lookup_prefab(
        &self,
        name: &str,
    ) -> PreFabConfig<C> {
        match self.try_lookup_prefab(name) {
            Ok(p) => p,
            Err(e) => panic!("{e}"),
        }
    }

    /// Lookup a prefab and its named weights.
    ///
    /// # Arguments
    ///
    /// - `name`: ``"{prefab}.{weights}"``, or ``"{prefab}"`` for no weights.
    pub fn try_lookup_prefab_and_weights(
        &self,
        name: &str,
    ) -> anyhow::Result<(PreFabConfig<C>, Option<PretrainedWeightsDescriptor>)> {
        let prefab = self.try_lookup_prefab(name)?;
        let weights = match split_prefab_name(name).1 {
            Some(weights) => Some(prefab.try_lookup_pretrained_weights(weights)?),
            None => None,
        };
        Ok((prefab, weights))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::weights::StaticPretrainedWeightsDescriptor;

    #[derive(Config, Debug)]
    struct TestConfig {
        size: usize,
    }

    static TEST_MAP: StaticPreFabMap<TestConfig> = StaticPreFabMap {
        name: "test",
        description: "test prefabs",
        items: &[
            &StaticPreFabConfig {
                name: "small",
                description: "small test config",
                builder: || TestConfig::new(1),
                weights: None,
            },
            &StaticPreFabConfig {
                name: "large",
                description: "large test config",
                builder: || TestConfig::new(100),
                weights: Some(&StaticPretrainedWeightsMap {
                    items: &[&StaticPretrainedWeightsDescriptor {
                        name: "local",
                        description: "local weights",
                        license: None,
                        origin: None,
                        urls: &["https://example.com/weights/large.mpk"],
                    }],
                }),
            },
        ],
    };

    #[test]
    fn test_split_prefab_name() {
        assert_eq!(split_prefab_name("senet_52"), ("senet_52", None));
        assert_eq!(
            split_prefab_name("senet_52.in1k"),
            ("senet_52", Some("in1k"))
        );
    }

    #[test]
    fn test_lookup_prefab() {
        assert_eq!(TEST_MAP.names(), vec!["small", "large"]);

        let prefab = TEST_MAP.expect_lookup_prefab("small");
        assert_eq!(prefab.name, "small");
        assert_eq!(prefab.to_config().size, 1);
        assert!(prefab.weights.is_none());
        assert!(prefab.lookup_pretrained_weights("local").is_none());

        assert_eq!(
            TEST_MAP.expect_lookup_prefab("large.local").to_config().size,
            100
        );

        let err = TEST_MAP.try_lookup_prefab("medium").unwrap_err();
        assert!(err.to_string().contains("Unknown test prefab"), "{err}");
    }

    #[test]
    fn test_lookup_prefab_and_weights() {
        let (prefab, weights) = TEST_MAP.try_lookup_prefab_and_weights("large.local").unwrap();
        assert_eq!(prefab.name, "large");
        assert_eq!(weights.unwrap().name, "local");

        let (_, weights) = TEST_MAP.try_lookup_prefab_and_weights("large").unwrap();
        assert!(weights.is_none());

        assert!(
            TEST_MAP
                .try_lookup_prefab_and_weights("small.local")
                .is_err()
        );
    }

    #[test]
    #[should_panic(expected = "Unknown test prefab")]
    fn test_expect_lookup_prefab_panics() {
        let _ = TEST_MAP.expect_lookup_prefab("nope");
    }
}
