//! WASAPI [`IoApiBackend`] — enumerates Windows audio render/capture
//! endpoints as [`IoEntry`] values.
//!
//! Non-Windows builds compile a stub that enumerates nothing; this keeps
//! the workspace buildable on every platform without gating the crate
//! out of the member list entirely.

use txproto_core::io_registry::{stable_id, IoApiBackend, IoEntry};
use txproto_core::object::Kind;
use txproto_core::error::{TxError, TxResult};

/// Which direction of WASAPI endpoint a backend instance enumerates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Render,
    Capture,
}

impl Direction {
    fn kind(self) -> Kind {
        match self {
            Direction::Render => Kind::AudioSink,
            Direction::Capture => Kind::AudioSrc,
        }
    }
}

/// [`IoApiBackend`] over the Windows Core Audio (WASAPI) device
/// enumeration API, covering one endpoint direction per instance — the
/// registry is built with one of each to discover both render and
/// capture devices.
pub struct WasapiBackend {
    direction: Direction,
}

impl WasapiBackend {
    #[must_use]
    pub fn new(direction: Direction) -> Self {
        Self { direction }
    }
}

#[cfg(windows)]
mod platform {
    use super::Direction;
    use txproto_core::error::TxError;
    use windows::core::GUID;
    use windows::Win32::Devices::Properties::DEVPKEY_Device_FriendlyName;
    use windows::Win32::Media::Audio::{
        eCapture, eConsole, eRender, EDataFlow, IMMDevice, IMMDeviceCollection,
        IMMDeviceEnumerator, MMDeviceEnumerator, DEVICE_STATE_ACTIVE,
    };
    use windows::Win32::System::Com::StructuredStorage::PropVariantToStringAlloc;
    use windows::Win32::System::Com::{
        CoCreateInstance, CoInitializeEx, CLSCTX_ALL, COINIT_MULTITHREADED,
    };

    fn data_flow(direction: Direction) -> EDataFlow {
        match direction {
            Direction::Render => eRender,
            Direction::Capture => eCapture,
        }
    }

    fn device_name(device: &IMMDevice) -> windows::core::Result<String> {
        unsafe {
            let store = device.OpenPropertyStore(windows::Win32::System::Com::STGM_READ)?;
            let value = store.GetValue(&DEVPKEY_Device_FriendlyName as *const _ as *const _)?;
            let wide = PropVariantToStringAlloc(&value)?;
            Ok(wide.to_string()?)
        }
    }

    fn device_id(device: &IMMDevice) -> windows::core::Result<String> {
        unsafe { Ok(device.GetId()?.to_string()?) }
    }

    /// Enumerates every active endpoint for `direction`, CRC-identified by
    /// its WASAPI device id (stable across process restarts; matches
    /// `gen_device_id`'s use of the endpoint id string, not its friendly
    /// name, as the identifier source).
    pub fn enumerate(direction: Direction) -> windows::core::Result<Vec<(String, String, bool)>> {
        unsafe {
            // Ignore RPC_E_CHANGED_MODE: a COM apartment may already be set
            // up by the host process on this thread.
            let _ = CoInitializeEx(None, COINIT_MULTITHREADED);

            let enumerator: IMMDeviceEnumerator =
                CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)?;
            let collection: IMMDeviceCollection =
                enumerator.EnumAudioEndpoints(data_flow(direction), DEVICE_STATE_ACTIVE)?;

            let default_id = enumerator
                .GetDefaultAudioEndpoint(data_flow(direction), eConsole)
                .ok()
                .and_then(|dev| device_id(&dev).ok());

            let count = collection.GetCount()?;
            let mut out = Vec::with_capacity(count as usize);
            for i in 0..count {
                let device = collection.Item(i)?;
                let id = device_id(&device)?;
                let name = device_name(&device).unwrap_or_else(|_| id.clone());
                let is_default = default_id.as_deref() == Some(id.as_str());
                out.push((id, name, is_default));
            }
            Ok(out)
        }
    }

    pub fn map_err(err: windows::core::Error) -> TxError {
        TxError::External(err.code().0)
    }
}

impl IoApiBackend for WasapiBackend {
    fn name(&self) -> &str {
        match self.direction {
            Direction::Render => "wasapi-render",
            Direction::Capture => "wasapi-capture",
        }
    }

    #[cfg(windows)]
    fn enumerate(&self) -> TxResult<Vec<IoEntry>> {
        let kind = self.direction.kind();
        platform::enumerate(self.direction)
            .map_err(platform::map_err)
            .map(|devices| {
                devices
                    .into_iter()
                    .map(|(id, name, is_default)| {
                        IoEntry::new(stable_id(&id), name, kind, is_default)
                    })
                    .collect()
            })
    }

    #[cfg(not(windows))]
    fn enumerate(&self) -> TxResult<Vec<IoEntry>> {
        Err(TxError::Unsupported(
            "WASAPI backend is only available on Windows",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_name_reflects_direction() {
        assert_eq!(WasapiBackend::new(Direction::Render).name(), "wasapi-render");
        assert_eq!(
            WasapiBackend::new(Direction::Capture).name(),
            "wasapi-capture"
        );
    }

    #[cfg(not(windows))]
    #[test]
    fn non_windows_enumerate_is_unsupported() {
        let backend = WasapiBackend::new(Direction::Capture);
        assert!(backend.enumerate().is_err());
    }
}
