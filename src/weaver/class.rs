//! Whole-class weaving.

use rayon::prelude::*;
use strum::Display;

use crate::{
    classfile::{attribute::CODE, ClassFile, CodeAttribute, MethodDescriptor},
    weaver::{
        config::WeaveConfig,
        filter::is_eligible,
        label::{LabelCache, MonitoringLabel},
        method::{MethodBodyRewriter, MethodTarget},
        resolver::ListenerResolver,
        stats::WeaveStats,
    },
    Result,
};

/// What happened to one method during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum WeaveDecision {
    /// Constructor, static initializer, abstract or native; the resolver was not asked
    Ineligible,
    /// The resolver returned no listeners
    Declined,
    /// The body was rewritten
    Woven,
}

/// Per-method outcome of a pass, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodReport {
    /// Method name
    pub name: String,
    /// Raw method descriptor
    pub descriptor: String,
    /// Monitoring label, computed for eligible methods only
    pub label: Option<MonitoringLabel>,
    /// The decision taken
    pub decision: WeaveDecision,
}

/// Weaves the monitored methods of one class at a time.
///
/// A weaver is cheap to create and keeps only per-pass state: the instrumented counter and the
/// method reports of the last [`ClassWeaver::weave`] call. Each pass starts from scratch.
///
/// # Examples
///
/// ```rust,no_run
/// use classweave::{ClassWeaver, WeaveConfig};
///
/// let original = std::fs::read("Service.class")?;
/// let resolver = |label: &str, _original: &[u8]| label.contains(".handle(").then_some(());
/// let config = WeaveConfig::default();
///
/// let mut weaver = ClassWeaver::new(&resolver, &config);
/// let woven = weaver.weave(&original)?;
/// if weaver.was_instrumented() {
///     std::fs::write("Service.class", woven)?;
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct ClassWeaver<'a, R: ListenerResolver> {
    resolver: &'a R,
    config: &'a WeaveConfig,
    stats: Option<&'a WeaveStats>,
    instrumented: usize,
    reports: Vec<MethodReport>,
}

impl<'a, R: ListenerResolver> ClassWeaver<'a, R> {
    /// Create a weaver consulting `resolver` and emitting hooks per `config`.
    pub fn new(resolver: &'a R, config: &'a WeaveConfig) -> Self {
        ClassWeaver {
            resolver,
            config,
            stats: None,
            instrumented: 0,
            reports: Vec::new(),
        }
    }

    /// Also add every pass's outcome to `stats`.
    #[must_use]
    pub fn with_stats(mut self, stats: &'a WeaveStats) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Weave one class.
    ///
    /// Methods are visited in declaration order. Eligible methods are offered to the resolver
    /// exactly once; accepted ones are rewritten. If no method was woven the returned bytes
    /// equal `bytes`.
    ///
    /// # Errors
    /// Returns the parse error if `bytes` is not a well-formed class file, or
    /// [`crate::Error::Rewrite`] if an accepted method cannot be rewritten. The class must then
    /// be used unwoven; [`ClassWeaver::was_instrumented`] reports `false`.
    pub fn weave(&mut self, bytes: &[u8]) -> Result<Vec<u8>> {
        self.instrumented = 0;
        self.reports.clear();

        match self.weave_class(bytes) {
            Ok(woven) => {
                if let Some(stats) = self.stats {
                    stats.record_class(
                        self.instrumented,
                        self.count(WeaveDecision::Declined),
                        self.count(WeaveDecision::Ineligible),
                    );
                }
                Ok(woven)
            }
            Err(error) => {
                log::warn!("Leaving class unwoven: {}", error);
                self.instrumented = 0;
                if let Some(stats) = self.stats {
                    stats.record_failure();
                }
                Err(error)
            }
        }
    }

    /// Returns `true` if the last pass rewrote at least one method.
    #[must_use]
    pub fn was_instrumented(&self) -> bool {
        self.instrumented > 0
    }

    /// Per-method outcomes of the last pass.
    #[must_use]
    pub fn reports(&self) -> &[MethodReport] {
        &self.reports
    }

    /// Take the reports of the last pass, leaving none behind.
    pub fn take_reports(&mut self) -> Vec<MethodReport> {
        std::mem::take(&mut self.reports)
    }

    fn count(&self, decision: WeaveDecision) -> usize {
        self.reports
            .iter()
            .filter(|report| report.decision == decision)
            .count()
    }

    fn weave_class(&mut self, bytes: &[u8]) -> Result<Vec<u8>> {
        let mut class = ClassFile::parse(bytes)?;
        let class_name = class.this_class_name()?;
        let this_class = class.this_class;
        let stack_maps = class.uses_stack_maps();
        let mut labels = LabelCache::new();

        let ClassFile {
            constant_pool,
            methods,
            ..
        } = &mut class;

        for method in methods.iter_mut() {
            let name = constant_pool.utf8(method.name_index)?;
            let raw_descriptor = constant_pool.utf8(method.descriptor_index)?;
            let flags = method.method_flags();

            if !is_eligible(flags, &name) {
                log::trace!("{}.{}{}: not eligible", class_name, name, raw_descriptor);
                self.reports.push(MethodReport {
                    name,
                    descriptor: raw_descriptor,
                    label: None,
                    decision: WeaveDecision::Ineligible,
                });
                continue;
            }

            let descriptor = MethodDescriptor::parse(&raw_descriptor)?;
            let label = labels.get_or_insert(&class_name, &name, &raw_descriptor, &descriptor);

            if self.resolver.resolve(label.as_str(), bytes).is_none() {
                log::debug!("{}: declined", label);
                self.reports.push(MethodReport {
                    name,
                    descriptor: raw_descriptor,
                    label: Some(label),
                    decision: WeaveDecision::Declined,
                });
                continue;
            }

            self.instrumented += 1;
            let position = method
                .find_attribute(constant_pool, CODE)?
                .ok_or_else(|| rewrite_error!(label, "Method has no Code attribute"))?;
            let code = CodeAttribute::parse(&method.attributes[position].info)
                .map_err(|error| rewrite_error!(label, "{}", error))?;

            let target = MethodTarget {
                label: &label,
                descriptor: &descriptor,
                is_static: flags.is_static(),
            };
            let woven = MethodBodyRewriter::new(constant_pool, self.config, this_class, stack_maps)
                .rewrite(&target, &code)?;
            method.attributes[position].info = woven.to_bytes()?;

            log::debug!("{}: woven", label);
            self.reports.push(MethodReport {
                name,
                descriptor: raw_descriptor,
                label: Some(label),
                decision: WeaveDecision::Woven,
            });
        }

        if self.instrumented == 0 {
            return Ok(bytes.to_vec());
        }

        log::debug!(
            "{}: woven {} of {} methods",
            class_name,
            self.instrumented,
            self.reports.len()
        );
        class.to_bytes()
    }
}

/// Result of weaving one class through [`weave_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WovenClass {
    /// The class bytes, unchanged if nothing was woven
    pub bytes: Vec<u8>,
    /// Whether any method was woven
    pub instrumented: bool,
    /// Per-method outcomes
    pub reports: Vec<MethodReport>,
}

/// Weave independent classes in parallel.
///
/// Every class gets its own [`ClassWeaver`]; only the resolver, the configuration and the
/// optional counters are shared. Results are returned in input order, and a failing class does
/// not affect the others.
///
/// # Examples
///
/// ```rust,no_run
/// use classweave::weaver::{weave_all, ListenerRegistry, ListenerSet};
/// use classweave::WeaveConfig;
///
/// let registry = ListenerRegistry::new();
/// registry.register_class("com.acme.Service", ListenerSet::new(["timing"]));
///
/// let classes = vec![std::fs::read("Service.class")?, std::fs::read("Repo.class")?];
/// for result in weave_all(&classes, &registry, &WeaveConfig::default(), None) {
///     match result {
///         Ok(woven) => println!("instrumented: {}", woven.instrumented),
///         Err(error) => eprintln!("{error}"),
///     }
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn weave_all<B, R>(
    classes: &[B],
    resolver: &R,
    config: &WeaveConfig,
    stats: Option<&WeaveStats>,
) -> Vec<Result<WovenClass>>
where
    B: AsRef<[u8]> + Sync,
    R: ListenerResolver + Sync,
{
    classes
        .par_iter()
        .map(|bytes| {
            let mut weaver = ClassWeaver::new(resolver, config);
            if let Some(stats) = stats {
                weaver = weaver.with_stats(stats);
            }
            let woven = weaver.weave(bytes.as_ref())?;
            Ok(WovenClass {
                bytes: woven,
                instrumented: weaver.was_instrumented(),
                reports: weaver.take_reports(),
            })
        })
        .collect()
}
