//! Name-based construction of strategies and replacement policies.
//!
//! The registry replaces run-time module loading: external strategies are
//! compiled in and registered through [`Registry::register_abr`] /
//! [`Registry::register_replacement`] before the session is built.

use std::collections::HashMap;

use sim_engine::{Abr, Manifest, Replacement};

use crate::bola::Bola;
use crate::bola_enh::BolaEnh;
use crate::dynamic::{Dynamic, DynamicDash};
use crate::replacement::{NoReplace, Replace, ScanDirection};
use crate::throughput::ThroughputRule;
use crate::{RuleConfig, StrategyError};

pub type AbrFactory = Box<dyn Fn(&Manifest, &RuleConfig) -> Box<dyn Abr>>;
pub type ReplacementFactory = Box<dyn Fn() -> Box<dyn Replacement>>;

pub struct Registry {
    abr: HashMap<String, AbrFactory>,
    replacement: HashMap<String, ReplacementFactory>,
}

impl Registry {
    /// The default registry carries the built-in families.
    pub fn with_builtins() -> Self {
        let mut registry = Self {
            abr: HashMap::new(),
            replacement: HashMap::new(),
        };

        registry.register_abr("bola", |manifest, config| {
            Box::new(Bola::new(manifest, config))
        });
        registry.register_abr("bolae", |manifest, config| {
            Box::new(BolaEnh::new(manifest, config))
        });
        registry.register_abr("throughput", |_manifest, config| {
            Box::new(ThroughputRule::new(config))
        });
        registry.register_abr("dynamic", |manifest, config| {
            Box::new(Dynamic::new(manifest, config))
        });
        registry.register_abr("dynamicdash", |manifest, config| {
            Box::new(DynamicDash::new(manifest, config))
        });

        registry.register_replacement("none", || Box::new(NoReplace));
        registry.register_replacement("left", || Box::new(Replace::new(ScanDirection::Left)));
        registry.register_replacement("right", || Box::new(Replace::new(ScanDirection::Right)));

        registry
    }

    pub fn register_abr(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn(&Manifest, &RuleConfig) -> Box<dyn Abr> + 'static,
    ) {
        self.abr.insert(name.into(), Box::new(factory));
    }

    pub fn register_replacement(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn() -> Box<dyn Replacement> + 'static,
    ) {
        self.replacement.insert(name.into(), Box::new(factory));
    }

    pub fn build_abr(
        &self,
        name: &str,
        manifest: &Manifest,
        config: &RuleConfig,
    ) -> Result<Box<dyn Abr>, StrategyError> {
        self.abr
            .get(name)
            .map(|factory| factory(manifest, config))
            .ok_or_else(|| StrategyError::UnknownAbr(name.to_owned()))
    }

    pub fn build_replacement(&self, name: &str) -> Result<Box<dyn Replacement>, StrategyError> {
        self.replacement
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| StrategyError::UnknownReplacement(name.to_owned()))
    }

    pub fn abr_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.abr.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn replacement_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.replacement.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
