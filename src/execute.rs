//! Walks a built document and drives the construction capability.

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info};

use std::time::{Duration, Instant};

use crate::construct::EntityConstructor;
use crate::element::{Element, RootConfig, Sequence};
use crate::error::{Result, SeedlingError};
use crate::reference::ReferenceTable;
use crate::template::ProgressTracker;

pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Entities handed to the constructor.
    pub entities: usize,
    /// Load elements executed.
    pub loads: usize,
    /// Loads that bound a new reference.
    pub loads_bound: usize,
    /// Sequence iterations, over all sequences.
    pub iterations: usize,
}

/// One execution run. Owns the reference table, so independent runners may
/// execute independent documents concurrently.
pub struct Runner<'c> {
    constructor: Option<&'c mut dyn EntityConstructor>,
    references: ReferenceTable,
    rng: StdRng,
    progress_interval: Duration,
}

impl<'c> Runner<'c> {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }
    /// A runner whose template functions generate reproducible data.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }
    fn with_rng(rng: StdRng) -> Self {
        Self {
            constructor: None,
            references: ReferenceTable::new(),
            rng,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }
    pub fn attach(&mut self, constructor: &'c mut dyn EntityConstructor) -> &mut Self {
        self.constructor = Some(constructor);
        self
    }
    /// References bound by the last run.
    pub fn references(&self) -> &ReferenceTable {
        &self.references
    }

    /// Executes every element of `root` in document order. The first error
    /// aborts the run; whatever was persisted before it stays persisted.
    pub fn run(&mut self, root: &mut RootConfig) -> Result<RunSummary> {
        let constructor = self
            .constructor
            .as_deref_mut()
            .ok_or(SeedlingError::MissingConstructor)?;
        self.references = ReferenceTable::new();
        info!(namespace = root.root().namespace(), "run started");
        constructor.begin_run()?;
        let mut walk = Walk {
            constructor: &mut *constructor,
            references: &mut self.references,
            rng: &mut self.rng,
            progress_interval: self.progress_interval,
            summary: RunSummary::default(),
        };
        let outcome = walk.elements(root.children_mut());
        let summary = walk.summary;
        let ended = constructor.end_run();
        outcome?;
        ended?;
        info!(
            entities = summary.entities,
            loads = summary.loads,
            iterations = summary.iterations,
            references = self.references.len(),
            "run finished"
        );
        Ok(summary)
    }
}

impl Default for Runner<'_> {
    fn default() -> Self {
        Self::new()
    }
}

struct Walk<'w> {
    constructor: &'w mut dyn EntityConstructor,
    references: &'w mut ReferenceTable,
    rng: &'w mut StdRng,
    progress_interval: Duration,
    summary: RunSummary,
}

impl Walk<'_> {
    fn elements(&mut self, elements: &mut [Element]) -> Result<()> {
        for element in elements {
            match element {
                Element::Entity(entity) => {
                    self.constructor.construct_and_save(entity, self.references)?;
                    self.summary.entities += 1;
                }
                Element::Load(load) => {
                    if self.constructor.add_reference(load, self.references)? {
                        self.summary.loads_bound += 1;
                    }
                    self.summary.loads += 1;
                }
                Element::Folder(folder) => self.elements(folder.children_mut())?,
                Element::Sequence(sequence) => self.sequence(sequence)?,
            }
        }
        Ok(())
    }

    fn sequence(&mut self, sequence: &mut Sequence) -> Result<()> {
        debug!(
            sequence = sequence.name(),
            min = sequence.min(),
            max = sequence.max(),
            step = sequence.step(),
            "sequence started"
        );
        let mut tracker = sequence
            .progress()
            .then(|| ProgressTracker::new(self.progress_interval, Instant::now()));
        for counter in sequence.counters() {
            if let Some(percent) = tracker
                .as_mut()
                .and_then(|t| t.observe(counter, sequence.max(), Instant::now()))
            {
                info!(sequence = sequence.name(), percent, "sequence progress");
            }
            let instance = sequence.instantiate(counter, &mut *self.rng)?;
            self.elements(instance)?;
            self.summary.iterations += 1;
        }
        sequence.clear_instance();
        Ok(())
    }
}
