//! Per-image processing state machine.
//!
//! Each image moves `Idle → PendingLoad → Processing → Idle`, with a
//! `PendingReload` detour when it must be re-fetched (cross-origin flag, or
//! restoring the original before reprocessing). An image that is not `Idle`
//! rejects further `apply` calls.
//!
//! Everything runs on one thread. Waits are one-shot continuations handed to
//! the host; a continuation carries the record's generation and does nothing
//! once `reset` has moved the generation on. No `RefCell` borrow is held
//! across a call into the host.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use lutgrade_core::{LutHandle, sanitize_strength};

use crate::backends::BackendSet;
use crate::config::CoordinatorConfig;
use crate::error::ProcessError;
use crate::host::{ImageFeed, ImageResource, ImageSource, LoadOutcome, ReadError, Readiness};

/// Processing phase of one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    PendingLoad,
    PendingReload,
    Processing,
}

/// What an `apply` call did.
#[derive(Debug)]
pub enum ApplyOutcome {
    /// The image now shows the processed output.
    Applied { backend: &'static str },
    /// Waiting on the host; the final outcome goes to the completion listener.
    Deferred,
    /// The image was already busy. Nothing was done.
    Rejected,
    /// The pass ended with the image unmodified.
    Failed(ProcessError),
}

type CompletionListener = Box<dyn FnMut(&Rc<dyn ImageResource>, &ApplyOutcome)>;

#[derive(Clone)]
struct Job {
    lut: LutHandle,
    strength: f32,
}

struct ImageRecord {
    image: Weak<dyn ImageResource>,
    phase: Phase,
    generation: u64,
    /// First non-derived source seen; never overwritten.
    original: Option<String>,
    /// A cross-origin reload was already forced during the current pass.
    reload_attempted: bool,
    /// Read-back stayed blocked after the forced reload.
    tainted: bool,
}

impl ImageRecord {
    fn new(image: &Rc<dyn ImageResource>) -> Self {
        Self {
            image: Rc::downgrade(image),
            phase: Phase::Idle,
            generation: 0,
            original: None,
            reload_attempted: false,
            tainted: false,
        }
    }
}

struct State {
    backends: BackendSet,
    records: HashMap<usize, ImageRecord>,
}

impl State {
    /// Drop records whose image has been dropped by the host.
    fn prune(&mut self) {
        self.records.retain(|_, r| r.image.strong_count() > 0);
    }
}

struct Shared {
    state: RefCell<State>,
    config: CoordinatorConfig,
    listener: RefCell<Option<CompletionListener>>,
}

/// Why a pass is waiting on the host.
enum Wait {
    Load,
    Reload,
}

/// Runs LUT passes over host images, one at a time per image.
///
/// Images are tracked without being kept alive; records of dropped images
/// are pruned whenever the coordinator touches its records.
pub struct ImageCoordinator {
    shared: Rc<Shared>,
}

impl ImageCoordinator {
    pub fn new(backends: BackendSet, config: CoordinatorConfig) -> Self {
        Self {
            shared: Rc::new(Shared {
                state: RefCell::new(State {
                    backends,
                    records: HashMap::new(),
                }),
                config,
                listener: RefCell::new(None),
            }),
        }
    }

    /// Probe backends according to `config`.
    pub fn from_config(config: CoordinatorConfig) -> Self {
        Self::new(BackendSet::probe(&config), config)
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.shared.config
    }

    /// Backend the next pass will try first.
    pub fn active_backend(&self) -> Option<&'static str> {
        self.shared.state.borrow().backends.active()
    }

    /// Called with every `Applied` or `Failed` outcome, whether it came
    /// back from `apply` directly or after a wait. `Rejected` and `Deferred`
    /// are not reported. Replaces any previous listener.
    pub fn on_complete(
        &self,
        listener: impl FnMut(&Rc<dyn ImageResource>, &ApplyOutcome) + 'static,
    ) {
        *self.shared.listener.borrow_mut() = Some(Box::new(listener));
    }

    /// Current phase of `image`; `Idle` for untracked images.
    pub fn phase(&self, image: &Rc<dyn ImageResource>) -> Phase {
        self.shared
            .state
            .borrow()
            .records
            .get(&image_key(image))
            .map_or(Phase::Idle, |r| r.phase)
    }

    /// The captured original source of `image`, if any.
    pub fn original_source(&self, image: &Rc<dyn ImageResource>) -> Option<String> {
        self.shared
            .state
            .borrow()
            .records
            .get(&image_key(image))
            .and_then(|r| r.original.clone())
    }

    /// Number of images with a live record.
    pub fn tracked_images(&self) -> usize {
        let mut state = self.shared.state.borrow_mut();
        state.prune();
        state.records.len()
    }

    /// Apply `lut` to `image` at `strength`.
    pub fn apply(
        &self,
        image: &Rc<dyn ImageResource>,
        lut: &LutHandle,
        strength: f32,
    ) -> ApplyOutcome {
        let job = Job {
            lut: lut.clone(),
            strength: sanitize_strength(strength),
        };
        Shared::apply(&self.shared, image, job)
    }

    /// Apply with the configured default strength.
    pub fn apply_default(&self, image: &Rc<dyn ImageResource>, lut: &LutHandle) -> ApplyOutcome {
        self.apply(image, lut, self.shared.config.default_strength)
    }

    /// Apply to each image in turn.
    pub fn apply_all<'a>(
        &self,
        images: impl IntoIterator<Item = &'a Rc<dyn ImageResource>>,
        lut: &LutHandle,
        strength: f32,
    ) -> Vec<ApplyOutcome> {
        images
            .into_iter()
            .map(|image| self.apply(image, lut, strength))
            .collect()
    }

    /// Restore the captured original and drop any in-flight state.
    ///
    /// Returns whether the displayed source changed. Pending continuations
    /// for the image become no-ops.
    pub fn reset(&self, image: &Rc<dyn ImageResource>) -> bool {
        let original = {
            let mut state = self.shared.state.borrow_mut();
            state.prune();
            let Some(record) = state.records.get_mut(&image_key(image)) else {
                return false;
            };
            record.generation += 1;
            record.phase = Phase::Idle;
            record.reload_attempted = false;
            record.original.clone()
        };
        let Some(original) = original else {
            return false;
        };
        if image.source() == ImageSource::Original(original.clone()) {
            return false;
        }
        tracing::debug!("restoring original source {original:?}");
        image.set_source(ImageSource::Original(original));
        true
    }

    /// [`reset`](Self::reset) every tracked image. Returns how many changed.
    pub fn reset_all(&self) -> usize {
        let images: Vec<Rc<dyn ImageResource>> = {
            let mut state = self.shared.state.borrow_mut();
            state.prune();
            state
                .records
                .values()
                .filter_map(|r| r.image.upgrade())
                .collect()
        };
        images.iter().filter(|image| self.reset(image)).count()
    }

    /// Restore every image, then release the backends.
    ///
    /// Later `apply` calls fail with [`ProcessError::Disposed`]. Calling it
    /// again does nothing.
    pub fn dispose(&self) {
        if self.shared.state.borrow().backends.is_disposed() {
            return;
        }
        let restored = self.reset_all();
        let mut state = self.shared.state.borrow_mut();
        state.records.clear();
        state.backends.dispose();
        tracing::info!("coordinator disposed, {restored} image(s) restored");
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.state.borrow().backends.is_disposed()
    }

    /// Apply `lut` at `strength` to every image `feed` reports.
    pub fn attach_feed(&self, feed: &dyn ImageFeed, lut: &LutHandle, strength: f32) {
        let weak = Rc::downgrade(&self.shared);
        let job = Job {
            lut: lut.clone(),
            strength: sanitize_strength(strength),
        };
        feed.subscribe(Box::new(move |image| {
            if let Some(shared) = weak.upgrade() {
                Shared::apply(&shared, &image, job.clone());
            }
        }));
    }
}

impl Shared {
    fn apply(this: &Rc<Self>, image: &Rc<dyn ImageResource>, job: Job) -> ApplyOutcome {
        let key = image_key(image);
        let admitted = {
            let mut state = this.state.borrow_mut();
            if state.backends.is_disposed() {
                drop(state);
                tracing::warn!("coordinator disposed, ignoring apply of LUT {:?}", job.lut.id());
                return Self::notify(this, image, ApplyOutcome::Failed(ProcessError::Disposed));
            }
            state.prune();
            let record = state
                .records
                .entry(key)
                .or_insert_with(|| ImageRecord::new(image));
            if record.phase != Phase::Idle {
                tracing::warn!(
                    "image busy ({:?}), ignoring apply of LUT {:?}",
                    record.phase,
                    job.lut.id()
                );
                return ApplyOutcome::Rejected;
            }
            if record.tainted {
                Err(ProcessError::SecurityTaint)
            } else {
                record.reload_attempted = false;
                Ok(record.generation)
            }
        };
        match admitted {
            Ok(generation) => Self::advance(this, image, key, generation, job),
            Err(error) => {
                tracing::warn!("not processing image: {error}");
                Self::notify(this, image, ApplyOutcome::Failed(error))
            }
        }
    }

    /// Continuation target: the wait registered under `generation` settled.
    fn resume(
        this: &Rc<Self>,
        image: &Weak<dyn ImageResource>,
        key: usize,
        generation: u64,
        job: Job,
        outcome: LoadOutcome,
    ) {
        let Some(image) = image.upgrade() else {
            return;
        };
        let current = this
            .state
            .borrow()
            .records
            .get(&key)
            .is_some_and(|r| {
                r.generation == generation
                    && matches!(r.phase, Phase::PendingLoad | Phase::PendingReload)
            });
        if !current {
            tracing::debug!("stale load continuation ignored");
            return;
        }
        match outcome {
            LoadOutcome::Loaded => {
                Self::advance(this, &image, key, generation, job);
            }
            LoadOutcome::Failed { reason } => {
                tracing::error!("image failed to load: {reason}");
                let error = ProcessError::ResourceLoad { reason };
                Self::finish(this, &image, key, ApplyOutcome::Failed(error));
            }
        }
    }

    /// Drive the pass as far as it can go without waiting.
    fn advance(
        this: &Rc<Self>,
        image: &Rc<dyn ImageResource>,
        key: usize,
        generation: u64,
        job: Job,
    ) -> ApplyOutcome {
        match image.readiness() {
            Readiness::Pending => return Self::wait(this, image, key, generation, job, Wait::Load),
            Readiness::Failed => {
                tracing::error!("image failed to load");
                let error = ProcessError::ResourceLoad {
                    reason: "image is in a failed state".to_string(),
                };
                return Self::finish(this, image, key, ApplyOutcome::Failed(error));
            }
            Readiness::Ready => {}
        }

        if image.requires_cross_origin() && !image.has_cross_origin_flag() {
            tracing::warn!("forcing reload with cross-origin access before read-back");
            if let Some(record) = this.state.borrow_mut().records.get_mut(&key) {
                record.reload_attempted = true;
            }
            image.set_cross_origin_flag();
            image.reload();
            return Self::wait(this, image, key, generation, job, Wait::Reload);
        }

        let source = image.source();
        let original = {
            let mut state = this.state.borrow_mut();
            let Some(record) = state.records.get_mut(&key) else {
                return ApplyOutcome::Rejected;
            };
            match (&source, &record.original) {
                (ImageSource::Original(url), None) => {
                    record.original = Some(url.clone());
                    None
                }
                (ImageSource::Processed(_), Some(original)) => Some(original.clone()),
                _ => None,
            }
        };
        if let Some(original) = original {
            tracing::debug!("reprocessing from original source {original:?}");
            image.set_source(ImageSource::Original(original));
            return Self::wait(this, image, key, generation, job, Wait::Reload);
        }

        Self::set_phase(this, key, Phase::Processing);
        let pixels = match image.read_pixels() {
            Ok(pixels) => pixels,
            Err(ReadError::Tainted) => return Self::on_tainted(this, image, key, generation, job),
            Err(ReadError::Unavailable(reason)) => {
                tracing::error!("could not read image pixels: {reason}");
                let error = ProcessError::ResourceLoad { reason };
                return Self::finish(this, image, key, ApplyOutcome::Failed(error));
            }
        };

        let result = this
            .state
            .borrow_mut()
            .backends
            .run(&pixels, &job.lut, job.strength);
        match result {
            Ok((output, backend)) => {
                tracing::debug!(
                    "applied LUT {:?} to {}x{} image on {backend}",
                    job.lut.id(),
                    output.width,
                    output.height
                );
                // Settle the record before the host sees the new source, so a
                // synchronous callback into the coordinator finds it idle.
                Self::settle(this, key);
                image.set_source(ImageSource::Processed(Arc::new(output)));
                Self::notify(this, image, ApplyOutcome::Applied { backend })
            }
            Err(e) => {
                tracing::error!("LUT pass failed: {e}");
                Self::finish(this, image, key, ApplyOutcome::Failed(e))
            }
        }
    }

    fn on_tainted(
        this: &Rc<Self>,
        image: &Rc<dyn ImageResource>,
        key: usize,
        generation: u64,
        job: Job,
    ) -> ApplyOutcome {
        let retry = {
            let mut state = this.state.borrow_mut();
            let Some(record) = state.records.get_mut(&key) else {
                return ApplyOutcome::Rejected;
            };
            if record.reload_attempted {
                record.tainted = true;
                false
            } else {
                record.reload_attempted = true;
                true
            }
        };
        if retry {
            tracing::warn!("pixel read-back blocked, reloading with cross-origin access");
            image.set_cross_origin_flag();
            image.reload();
            return Self::wait(this, image, key, generation, job, Wait::Reload);
        }
        tracing::error!("pixel read-back still blocked after reload, giving up on image");
        Self::finish(
            this,
            image,
            key,
            ApplyOutcome::Failed(ProcessError::SecurityTaint),
        )
    }

    /// Park the pass until the host reports the load settled.
    fn wait(
        this: &Rc<Self>,
        image: &Rc<dyn ImageResource>,
        key: usize,
        generation: u64,
        job: Job,
        wait: Wait,
    ) -> ApplyOutcome {
        let phase = match wait {
            Wait::Load => Phase::PendingLoad,
            Wait::Reload => Phase::PendingReload,
        };
        Self::set_phase(this, key, phase);

        let shared = Rc::downgrade(this);
        let weak_image = Rc::downgrade(image);
        image.on_settled(Box::new(move |outcome| {
            if let Some(shared) = shared.upgrade() {
                Self::resume(&shared, &weak_image, key, generation, job, outcome);
            }
        }));
        ApplyOutcome::Deferred
    }

    fn set_phase(this: &Rc<Self>, key: usize, phase: Phase) {
        if let Some(record) = this.state.borrow_mut().records.get_mut(&key) {
            record.phase = phase;
        }
    }

    /// End the pass: back to `Idle`, notify the listener.
    fn finish(
        this: &Rc<Self>,
        image: &Rc<dyn ImageResource>,
        key: usize,
        outcome: ApplyOutcome,
    ) -> ApplyOutcome {
        Self::settle(this, key);
        Self::notify(this, image, outcome)
    }

    fn settle(this: &Rc<Self>, key: usize) {
        if let Some(record) = this.state.borrow_mut().records.get_mut(&key) {
            record.phase = Phase::Idle;
            record.reload_attempted = false;
        }
    }

    fn notify(
        this: &Rc<Self>,
        image: &Rc<dyn ImageResource>,
        outcome: ApplyOutcome,
    ) -> ApplyOutcome {
        let listener = this.listener.borrow_mut().take();
        if let Some(mut listener) = listener {
            listener(image, &outcome);
            let mut slot = this.listener.borrow_mut();
            if slot.is_none() {
                *slot = Some(listener);
            }
        }
        outcome
    }
}

fn image_key(image: &Rc<dyn ImageResource>) -> usize {
    Rc::as_ptr(image) as *const () as usize
}
