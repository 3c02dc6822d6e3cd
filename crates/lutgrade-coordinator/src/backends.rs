//! Backend probe and selection.

use lutgrade_core::{CpuLutApplier, LutApplier, LutHandle, PixelBuffer};
use lutgrade_gpu::GpuLutEngine;

use crate::config::{BackendPreference, CoordinatorConfig};
use crate::error::ProcessError;

/// The LUT backends a coordinator can dispatch to.
///
/// The GPU slot holds any [`LutApplier`]; it is emptied for good the first
/// time it fails.
pub struct BackendSet {
    preference: BackendPreference,
    gpu: Option<Box<dyn LutApplier>>,
    cpu: CpuLutApplier,
    disposed: bool,
}

impl BackendSet {
    /// Probe for a GPU engine according to `config`.
    pub fn probe(config: &CoordinatorConfig) -> Self {
        let gpu = match config.backend {
            BackendPreference::Cpu => None,
            BackendPreference::Auto | BackendPreference::Gpu => {
                match GpuLutEngine::create_blocking(&config.gpu_options()) {
                    Ok(engine) => Some(Box::new(engine) as Box<dyn LutApplier>),
                    Err(e) => {
                        tracing::warn!("GPU backend unavailable: {e}");
                        None
                    }
                }
            }
        };
        let set = Self {
            preference: config.backend,
            gpu,
            cpu: CpuLutApplier,
            disposed: false,
        };
        match set.active() {
            Some(name) => tracing::info!("LUT backend: {name}"),
            None => tracing::error!("no LUT backend available under {:?}", config.backend),
        }
        set
    }

    /// CPU only.
    pub fn cpu_only() -> Self {
        Self {
            preference: BackendPreference::Cpu,
            gpu: None,
            cpu: CpuLutApplier,
            disposed: false,
        }
    }

    /// Use `gpu` as the accelerated backend.
    pub fn with_gpu(preference: BackendPreference, gpu: Box<dyn LutApplier>) -> Self {
        Self {
            preference,
            gpu: Some(gpu),
            cpu: CpuLutApplier,
            disposed: false,
        }
    }

    pub fn preference(&self) -> BackendPreference {
        self.preference
    }

    pub fn has_gpu(&self) -> bool {
        self.gpu.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Release the GPU backend. Every later [`run`](Self::run) fails with
    /// [`ProcessError::Disposed`].
    pub fn dispose(&mut self) {
        if let Some(mut gpu) = self.gpu.take() {
            tracing::debug!("disposing {} backend", gpu.name());
            gpu.dispose();
        }
        self.disposed = true;
    }

    /// Name of the backend the next pass will try first.
    pub fn active(&self) -> Option<&'static str> {
        if self.disposed {
            return None;
        }
        match (self.preference, self.gpu.as_ref()) {
            (BackendPreference::Cpu, _) => Some(self.cpu.name()),
            (_, Some(gpu)) => Some(gpu.name()),
            (BackendPreference::Auto, None) => Some(self.cpu.name()),
            (BackendPreference::Gpu, None) => None,
        }
    }

    /// Transform `image`, returning the output and the backend that made it.
    pub fn run(
        &mut self,
        image: &PixelBuffer,
        lut: &LutHandle,
        strength: f32,
    ) -> Result<(PixelBuffer, &'static str), ProcessError> {
        if self.disposed {
            return Err(ProcessError::Disposed);
        }
        if self.preference != BackendPreference::Cpu {
            match self.gpu.as_mut() {
                Some(gpu) => match gpu.apply_lut(image, lut, strength) {
                    Ok(out) => return Ok((out, gpu.name())),
                    Err(e) => {
                        tracing::warn!("{} backend failed, disabling it: {e}", gpu.name());
                        self.gpu = None;
                        if self.preference == BackendPreference::Gpu {
                            return Err(e.into());
                        }
                    }
                },
                None if self.preference == BackendPreference::Gpu => {
                    return Err(ProcessError::NoBackend);
                }
                None => {}
            }
        }
        let out = self.cpu.apply_lut(image, lut, strength)?;
        Ok((out, self.cpu.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lutgrade_core::{ApplyError, LutTable};

    struct FailingBackend;

    impl LutApplier for FailingBackend {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn apply_lut(
            &mut self,
            _image: &PixelBuffer,
            _lut: &LutHandle,
            _strength: f32,
        ) -> Result<PixelBuffer, ApplyError> {
            Err(ApplyError::Backend {
                backend: "failing",
                message: "device lost".to_string(),
            })
        }
    }

    fn inputs() -> (PixelBuffer, LutHandle) {
        (
            PixelBuffer::filled(2, 2, [10, 20, 30, 255]),
            LutHandle::new("identity", LutTable::identity(2).expect("valid size")),
        )
    }

    #[test]
    fn test_cpu_only_runs_cpu() {
        let (image, lut) = inputs();
        let mut set = BackendSet::cpu_only();
        let (out, name) = set.run(&image, &lut, 1.0).expect("cpu never fails");
        assert_eq!(name, "cpu");
        assert_eq!(out, image);
    }

    #[test]
    fn test_auto_falls_back_and_drops_failed_gpu() {
        let (image, lut) = inputs();
        let mut set = BackendSet::with_gpu(BackendPreference::Auto, Box::new(FailingBackend));
        assert_eq!(set.active(), Some("failing"));
        let (_, name) = set.run(&image, &lut, 1.0).expect("cpu fallback");
        assert_eq!(name, "cpu");
        assert!(!set.has_gpu());
        assert_eq!(set.active(), Some("cpu"));
    }

    #[test]
    fn test_gpu_preference_does_not_fall_back() {
        let (image, lut) = inputs();
        let mut set = BackendSet::with_gpu(BackendPreference::Gpu, Box::new(FailingBackend));
        assert!(matches!(
            set.run(&image, &lut, 1.0),
            Err(ProcessError::Backend(_))
        ));
        assert!(matches!(
            set.run(&image, &lut, 1.0),
            Err(ProcessError::NoBackend)
        ));
        assert_eq!(set.active(), None);
    }

    struct DisposeTracking(std::rc::Rc<std::cell::Cell<bool>>);

    impl LutApplier for DisposeTracking {
        fn name(&self) -> &'static str {
            "tracking"
        }

        fn apply_lut(
            &mut self,
            image: &PixelBuffer,
            _lut: &LutHandle,
            _strength: f32,
        ) -> Result<PixelBuffer, ApplyError> {
            Ok(image.clone())
        }

        fn dispose(&mut self) {
            self.0.set(true);
        }
    }

    #[test]
    fn test_dispose_releases_gpu_and_blocks_runs() {
        let (image, lut) = inputs();
        let released = std::rc::Rc::new(std::cell::Cell::new(false));
        let mut set = BackendSet::with_gpu(
            BackendPreference::Auto,
            Box::new(DisposeTracking(released.clone())),
        );
        set.dispose();
        assert!(released.get());
        assert!(set.is_disposed());
        assert!(!set.has_gpu());
        assert_eq!(set.active(), None);
        assert!(matches!(
            set.run(&image, &lut, 1.0),
            Err(ProcessError::Disposed)
        ));
    }

    #[test]
    fn test_cpu_preference_ignores_gpu() {
        let (image, lut) = inputs();
        let mut set = BackendSet::with_gpu(BackendPreference::Cpu, Box::new(FailingBackend));
        let (_, name) = set.run(&image, &lut, 1.0).expect("cpu");
        assert_eq!(name, "cpu");
        assert!(set.has_gpu());
    }
}
