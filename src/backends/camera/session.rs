// SPDX-License-Identifier: GPL-3.0-only

//! Capture session lifecycle
//!
//! The manager acquires its provider lazily on the first start, runs
//! exactly one bind per start or rebind, and hands out a [`SessionHandle`]
//! that unbinds on release. Every bind bumps a generation counter; a handle
//! only tears the provider down while its generation is current, so an old
//! handle cannot stop a newer session.

use super::{BindRequest, CameraProvider, SessionOutputs};
use crate::backends::camera::types::{BackendResult, CameraDevice};
use crate::errors::CameraError;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info};

/// Deferred provider constructor, run once on a blocking task
pub type ProviderFactory = Box<dyn FnOnce() -> BackendResult<Box<dyn CameraProvider>> + Send>;

struct SessionState {
    provider: Option<Box<dyn CameraProvider>>,
    /// Incremented on every successful bind
    generation: u64,
}

type SharedState = Arc<Mutex<SessionState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Binds camera providers to session outputs
pub struct CaptureSessionManager {
    factory: Option<ProviderFactory>,
    state: SharedState,
}

impl CaptureSessionManager {
    pub fn new(factory: ProviderFactory) -> Self {
        Self {
            factory: Some(factory),
            state: Arc::new(Mutex::new(SessionState {
                provider: None,
                generation: 0,
            })),
        }
    }

    /// Whether the provider has been constructed
    pub fn provider_acquired(&self) -> bool {
        lock(&self.state).provider.is_some()
    }

    pub fn is_bound(&self) -> bool {
        lock(&self.state)
            .provider
            .as_ref()
            .is_some_and(|p| p.is_bound())
    }

    /// Cameras known to the provider; empty before acquisition
    pub fn enumerate_cameras(&self) -> Vec<CameraDevice> {
        lock(&self.state)
            .provider
            .as_ref()
            .map(|p| p.enumerate_cameras())
            .unwrap_or_default()
    }

    /// Construct the provider if this is the first use
    pub async fn acquire(&mut self) -> Result<(), CameraError> {
        if self.provider_acquired() {
            return Ok(());
        }
        let Some(factory) = self.factory.take() else {
            return Err(CameraError::ProviderUnavailable(
                "camera provider could not be created".to_string(),
            ));
        };

        debug!("Acquiring camera provider");
        let provider = tokio::task::spawn_blocking(factory)
            .await
            .map_err(|e| CameraError::ProviderUnavailable(e.to_string()))??;

        info!(backend = %provider.backend_type(), "Camera provider acquired");
        lock(&self.state).provider = Some(provider);
        Ok(())
    }

    /// Acquire the provider if needed, clear any previous binding and bind once
    pub async fn start(
        &mut self,
        request: BindRequest,
        outputs: SessionOutputs,
    ) -> Result<SessionHandle, CameraError> {
        self.acquire().await?;

        let generation = bind_fresh(&self.state, &request, outputs.clone())?;
        info!(lens = %request.lens, torch = request.torch, generation, "Capture session started");

        Ok(SessionHandle {
            state: Arc::clone(&self.state),
            generation,
            request,
            outputs,
            released: false,
        })
    }

    /// Tear the session down and bind again with `request`
    pub fn rebind(&self, handle: &mut SessionHandle, request: BindRequest) -> Result<(), CameraError> {
        if handle.released {
            return Err(CameraError::BindFailed("session already released".to_string()));
        }
        if !Arc::ptr_eq(&handle.state, &self.state) {
            return Err(CameraError::BindFailed("session belongs to another manager".to_string()));
        }

        let generation = bind_fresh(&self.state, &request, handle.outputs.clone())?;
        debug!(lens = %request.lens, torch = request.torch, generation, "Capture session rebound");
        handle.generation = generation;
        handle.request = request;
        Ok(())
    }

    /// Release the session
    pub fn stop(&self, mut handle: SessionHandle) {
        handle.release();
    }
}

/// Unbind everything, then bind once; returns the new generation
fn bind_fresh(
    state: &SharedState,
    request: &BindRequest,
    outputs: SessionOutputs,
) -> Result<u64, CameraError> {
    let mut guard = lock(state);
    let Some(provider) = guard.provider.as_mut() else {
        return Err(CameraError::ProviderUnavailable(
            "camera provider not acquired".to_string(),
        ));
    };

    provider.unbind_all();
    if let Err(e) = provider.bind(request, outputs) {
        error!(error = %e, "Use case binding failed");
        return Err(e.into());
    }

    guard.generation += 1;
    Ok(guard.generation)
}

/// An active capture session
///
/// Dropping the handle releases it.
pub struct SessionHandle {
    state: SharedState,
    generation: u64,
    request: BindRequest,
    outputs: SessionOutputs,
    released: bool,
}

impl SessionHandle {
    /// The bind parameters currently in effect
    pub fn request(&self) -> &BindRequest {
        &self.request
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Unbind the provider unless a newer session has replaced this one.
    /// Idempotent.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let mut guard = lock(&self.state);
        if guard.generation != self.generation {
            debug!(
                handle = self.generation,
                current = guard.generation,
                "Session superseded; leaving newer binding in place"
            );
            return;
        }
        if let Some(provider) = guard.provider.as_mut() {
            provider.unbind_all();
        }
        info!(generation = self.generation, "Capture session released");
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("generation", &self.generation)
            .field("request", &self.request)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::frame_processor::{BackpressureStrategy, FrameSlot};
    use crate::backends::camera::types::{BackendError, CameraBackendType, LensFacing};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Bind { torch: bool, lens: LensFacing },
        Unbind,
    }

    struct RecordingProvider {
        calls: Arc<Mutex<Vec<Call>>>,
        bound: bool,
        fail_bind: bool,
    }

    impl CameraProvider for RecordingProvider {
        fn enumerate_cameras(&self) -> Vec<CameraDevice> {
            Vec::new()
        }

        fn bind(&mut self, request: &BindRequest, _outputs: SessionOutputs) -> BackendResult<()> {
            self.calls.lock().unwrap().push(Call::Bind {
                torch: request.torch,
                lens: request.lens,
            });
            if self.fail_bind {
                return Err(BackendError::PipelineFailed("no device".into()));
            }
            self.bound = true;
            Ok(())
        }

        fn unbind_all(&mut self) {
            self.calls.lock().unwrap().push(Call::Unbind);
            self.bound = false;
        }

        fn is_bound(&self) -> bool {
            self.bound
        }

        fn backend_type(&self) -> CameraBackendType {
            CameraBackendType::Virtual
        }
    }

    fn manager(fail_bind: bool) -> (CaptureSessionManager, Arc<Mutex<Vec<Call>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let provider_calls = Arc::clone(&calls);
        let factory: ProviderFactory = Box::new(move || {
            Ok(Box::new(RecordingProvider {
                calls: provider_calls,
                bound: false,
                fail_bind,
            }) as Box<dyn CameraProvider>)
        });
        (CaptureSessionManager::new(factory), calls)
    }

    fn outputs() -> SessionOutputs {
        SessionOutputs {
            analysis: Arc::new(FrameSlot::new(BackpressureStrategy::KeepOnlyLatest)),
            preview: None,
        }
    }

    #[tokio::test]
    async fn test_provider_is_acquired_lazily() {
        let (mut manager, calls) = manager(false);
        assert!(!manager.provider_acquired());

        let _handle = manager.start(BindRequest::default(), outputs()).await.unwrap();
        assert!(manager.provider_acquired());
        assert!(manager.is_bound());
        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                Call::Unbind,
                Call::Bind {
                    torch: false,
                    lens: LensFacing::Back
                }
            ]
        );
    }

    #[tokio::test]
    async fn test_rebind_is_one_unbind_and_one_bind() {
        let (mut manager, calls) = manager(false);
        let mut handle = manager.start(BindRequest::default(), outputs()).await.unwrap();
        calls.lock().unwrap().clear();

        let request = BindRequest {
            torch: true,
            ..BindRequest::default()
        };
        manager.rebind(&mut handle, request).unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                Call::Unbind,
                Call::Bind {
                    torch: true,
                    lens: LensFacing::Back
                }
            ]
        );
        assert!(handle.request().torch);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let (mut manager, calls) = manager(false);
        let mut handle = manager.start(BindRequest::default(), outputs()).await.unwrap();
        calls.lock().unwrap().clear();

        handle.release();
        handle.release();
        drop(handle);

        assert_eq!(*calls.lock().unwrap(), vec![Call::Unbind]);
        assert!(!manager.is_bound());
    }

    #[tokio::test]
    async fn test_stale_handle_does_not_stop_newer_session() {
        let (mut manager, calls) = manager(false);
        let mut old = manager.start(BindRequest::default(), outputs()).await.unwrap();
        let _new = manager.start(BindRequest::default(), outputs()).await.unwrap();
        calls.lock().unwrap().clear();

        old.release();

        assert!(calls.lock().unwrap().is_empty());
        assert!(manager.is_bound());
    }

    #[tokio::test]
    async fn test_bind_failure_is_returned() {
        let (mut manager, _calls) = manager(true);
        let result = manager.start(BindRequest::default(), outputs()).await;
        assert!(matches!(result, Err(CameraError::BindFailed(_))));
        assert!(!manager.is_bound());
    }

    #[tokio::test]
    async fn test_factory_failure_is_provider_unavailable() {
        let factory: ProviderFactory =
            Box::new(|| Err(BackendError::NotAvailable("no gstreamer".into())));
        let mut manager = CaptureSessionManager::new(factory);

        let first = manager.start(BindRequest::default(), outputs()).await;
        assert!(matches!(first, Err(CameraError::ProviderUnavailable(_))));
        let second = manager.start(BindRequest::default(), outputs()).await;
        assert!(matches!(second, Err(CameraError::ProviderUnavailable(_))));
    }
}
