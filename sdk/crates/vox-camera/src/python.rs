use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyString;

use crate::camera::{Camera, CameraHandle};
use crate::config::{CameraConfig, CameraProps, ConfigOverrides};
use crate::error::ConfigError;
use crate::native::NokhwaDevices;

/// Camera control for Python callers.
///
/// Owns a background tokio runtime that acquires and re-negotiates the
/// camera stream. Commands return immediately; before `start()` or after
/// `stop()` they do nothing.
#[pyclass]
struct VoxCamera {
    props: CameraProps,
    on_user_media_error: Option<Py<PyAny>>,
    // Dropped before the runtime so the unmount is seen by the loop.
    camera: Option<CameraHandle>,
    runtime: Option<tokio::runtime::Runtime>,
}

#[pymethods]
impl VoxCamera {
    /// Settings default to the `VOX_CAMERA_*` environment; keyword
    /// arguments override them. `video_constraints` is a constraint dict
    /// (or its JSON text) used instead of the built request.
    #[new]
    #[pyo3(signature = (width=None, height=None, facing_mode=None, zoom_policy=None, video_constraints=None, on_user_media_error=None))]
    fn new(
        width: Option<u32>,
        height: Option<u32>,
        facing_mode: Option<String>,
        zoom_policy: Option<String>,
        video_constraints: Option<&Bound<'_, PyAny>>,
        on_user_media_error: Option<Py<PyAny>>,
    ) -> PyResult<Self> {
        let video_constraints = match video_constraints {
            Some(value) if value.is_instance_of::<PyString>() => Some(value.extract::<String>()?),
            Some(value) => {
                let json = value.py().import("json")?;
                Some(json.call_method1("dumps", (value,))?.extract::<String>()?)
            }
            None => None,
        };

        let config = CameraConfig::from_env()
            .and_then(|config| {
                config.with_overrides(ConfigOverrides {
                    width,
                    height,
                    facing_mode,
                    zoom_policy,
                    video_constraints,
                })
            })
            .map_err(config_error)?;

        Ok(VoxCamera {
            props: config.into_props(),
            on_user_media_error,
            camera: None,
            runtime: None,
        })
    }

    /// Start the camera runtime and acquire the first stream.
    fn start(&mut self, py: Python<'_>) -> PyResult<()> {
        if self.camera.is_some() {
            return Err(PyErr::new::<PyRuntimeError, _>("Camera is already running"));
        }
        crate::init_logging();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("vox-camera")
            .build()
            .map_err(|e| PyErr::new::<PyRuntimeError, _>(format!("Failed to start runtime: {e}")))?;

        let mut props = self.props.clone();
        if let Some(callback) = &self.on_user_media_error {
            let callback = callback.clone_ref(py);
            props = props.with_error_callback(move |err| {
                Python::attach(|py| {
                    if let Err(e) = callback.call1(py, (err.name(), err.to_string())) {
                        e.print(py);
                    }
                });
            });
        }

        let camera = {
            let _guard = runtime.enter();
            Camera::mount(std::sync::Arc::new(NokhwaDevices::default()), props)
        };
        self.camera = Some(camera);
        self.runtime = Some(runtime);
        Ok(())
    }

    /// Unmount the camera, release every stream and shut the runtime down.
    fn stop(&mut self, py: Python<'_>) -> PyResult<()> {
        let camera = self.camera.take();
        if let Some(runtime) = self.runtime.take() {
            py.detach(move || {
                if let Some(camera) = camera {
                    runtime.block_on(camera.unmount());
                }
                runtime.shutdown_background();
            });
        }
        Ok(())
    }

    /// JPEG data URI of the frame on display, or None.
    fn snapshot(&self, py: Python<'_>) -> Option<String> {
        let camera = self.camera.as_ref()?;
        py.detach(|| camera.snapshot())
    }

    fn zoom_in(&self) {
        if let Some(camera) = &self.camera {
            camera.zoom_in();
        }
    }

    fn zoom_out(&self) {
        if let Some(camera) = &self.camera {
            camera.zoom_out();
        }
    }

    fn switch_facing_mode(&self) {
        if let Some(camera) = &self.camera {
            camera.switch_facing_mode();
        }
    }

    fn get_max_zoom_level(&self) -> f64 {
        self.camera
            .as_ref()
            .map(|camera| camera.max_zoom_level())
            .unwrap_or(1.0)
    }

    fn get_current_zoom_level(&self) -> u32 {
        self.camera
            .as_ref()
            .map(|camera| camera.current_zoom_level())
            .unwrap_or(crate::state::MIN_ZOOM)
    }

    /// "environment" or "user".
    #[getter]
    fn facing_mode(&self) -> &'static str {
        self.camera
            .as_ref()
            .map(|camera| camera.facing_mode())
            .unwrap_or(self.props.facing_mode)
            .as_str()
    }
}

fn config_error(err: ConfigError) -> PyErr {
    PyErr::new::<PyValueError, _>(err.to_string())
}

/// Python module definition.
#[pymodule]
fn vox_camera(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<VoxCamera>()?;
    Ok(())
}
