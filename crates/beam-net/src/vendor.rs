//! Dynamically loaded vendor decoder module.

use std::ffi::{c_int, c_void};
use std::path::{Path, PathBuf};

use libloading::Library;

use crate::decoder::{DecoderBackend, SAMPLE_STRIDE};

/// File name of the vendor module when no path is configured.
pub const DEFAULT_LIBRARY_NAME: &str = "linetD2_x64.dll";

type InitFn = unsafe extern "C" fn(c_int);
type ReadLaserDataFn = unsafe extern "C" fn(*mut c_void, c_int);
type GetDataFn = unsafe extern "C" fn(c_int, *mut c_int) -> *mut c_void;
type ReleaseFn = unsafe extern "C" fn();

/// Decoder backed by the vendor's shared library.
///
/// `Init` runs once in [`initialize`](DecoderBackend::initialize) and
/// `Release` once on drop; the library stays loaded in between.
pub struct LibraryDecoder {
    path: PathBuf,
    init: InitFn,
    read_laser_data: ReadLaserDataFn,
    get_data: GetDataFn,
    release: ReleaseFn,
    initialized: bool,
    scratch: Vec<u8>,
    // Dropped last so the function pointers above stay valid until then.
    _library: Library,
}

impl LibraryDecoder {
    /// Load the module from `path`.
    pub fn load(path: &Path) -> Result<Self, String> {
        // SAFETY: loading runs the module's initializers; the vendor module
        // has none beyond its C runtime.
        let library = unsafe { Library::new(path) }
            .map_err(|e| format!("Failed to load decoder module {}: {}", path.display(), e))?;

        // SAFETY: signatures match the vendor's exported C ABI.
        let (init, read_laser_data, get_data, release) = unsafe {
            let init = *library.get::<InitFn>(b"Init\0").map_err(|e| missing(path, "Init", e))?;
            let read = *library
                .get::<ReadLaserDataFn>(b"ReadLaserData\0")
                .map_err(|e| missing(path, "ReadLaserData", e))?;
            let get = *library.get::<GetDataFn>(b"GetData\0").map_err(|e| missing(path, "GetData", e))?;
            let release = *library.get::<ReleaseFn>(b"Release\0").map_err(|e| missing(path, "Release", e))?;
            (init, read, get, release)
        };

        Ok(Self {
            path: path.to_path_buf(),
            init,
            read_laser_data,
            get_data,
            release,
            initialized: false,
            scratch: Vec::new(),
            _library: library,
        })
    }

    /// Load from an explicit path, or search the working directory and
    /// then the executable's directory for the default module name.
    pub fn locate(explicit: Option<&Path>) -> Result<Self, String> {
        let mut last_error = format!("Decoder module {} not found", DEFAULT_LIBRARY_NAME);
        for candidate in search_paths(explicit) {
            match Self::load(&candidate) {
                Ok(decoder) => return Ok(decoder),
                Err(e) => last_error = e,
            }
        }
        Err(last_error)
    }
}

/// Candidate module paths in load order. Default candidates are absolute
/// because the loader never searches the working directory for a bare name.
fn search_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
    if let Some(path) = explicit {
        return vec![path.to_path_buf()];
    }
    let cwd = std::env::current_dir().ok();
    let exe_dir = std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf));
    cwd.into_iter()
        .chain(exe_dir)
        .map(|dir| dir.join(DEFAULT_LIBRARY_NAME))
        .collect()
}

fn missing(path: &Path, symbol: &str, e: libloading::Error) -> String {
    format!("Decoder module {} has no {} export: {}", path.display(), symbol, e)
}

impl DecoderBackend for LibraryDecoder {
    fn initialize(&mut self, max_devices: usize) -> Result<(), String> {
        if self.initialized {
            return Ok(());
        }
        let max_devices = c_int::try_from(max_devices).map_err(|_| format!("Too many devices: {}", max_devices))?;
        // SAFETY: Init takes the device count by value.
        unsafe { (self.init)(max_devices) };
        self.initialized = true;
        Ok(())
    }

    fn read_packet(&mut self, data: &[u8]) {
        let Ok(len) = c_int::try_from(data.len()) else {
            return;
        };
        // The module takes a mutable pointer, so hand it a private copy.
        self.scratch.clear();
        self.scratch.extend_from_slice(data);
        // SAFETY: scratch holds exactly `len` initialized bytes.
        unsafe { (self.read_laser_data)(self.scratch.as_mut_ptr().cast(), len) };
    }

    fn device_samples(&mut self, device: usize) -> Option<&[f32]> {
        let device = c_int::try_from(device).ok()?;
        let mut count: c_int = 0;
        // SAFETY: GetData writes the point count and returns either null or
        // a buffer of `count * 6` floats owned by the module, valid until
        // the next ReadLaserData call. The returned slice borrows `self`
        // mutably, which rules out such a call while it is alive.
        unsafe {
            let data = (self.get_data)(device, &mut count);
            if data.is_null() || count <= 0 {
                return None;
            }
            Some(std::slice::from_raw_parts(data.cast::<f32>(), count as usize * SAMPLE_STRIDE))
        }
    }

    fn name(&self) -> &str {
        self.path.to_str().unwrap_or(DEFAULT_LIBRARY_NAME)
    }
}

impl Drop for LibraryDecoder {
    fn drop(&mut self) {
        if self.initialized {
            // SAFETY: paired with the single Init call.
            unsafe { (self.release)() };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_module() {
        let err = match LibraryDecoder::load(Path::new("/nonexistent/module.so")) {
            Ok(_) => panic!("loaded a module that does not exist"),
            Err(e) => e,
        };
        assert!(err.contains("/nonexistent/module.so"));
    }

    #[test]
    fn test_explicit_path_is_the_only_candidate() {
        let path = Path::new("decoders/custom.so");
        assert_eq!(search_paths(Some(path)), vec![path.to_path_buf()]);
    }

    #[test]
    fn test_default_candidates_are_absolute() {
        let candidates = search_paths(None);
        assert!(!candidates.is_empty());
        assert_eq!(candidates[0], std::env::current_dir().unwrap().join(DEFAULT_LIBRARY_NAME));
        for candidate in &candidates {
            assert!(candidate.is_absolute());
            assert!(candidate.ends_with(DEFAULT_LIBRARY_NAME));
        }
    }
}
