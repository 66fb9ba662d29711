//! Runtime CPU capability probing and backend selection
//!
//! The probe runs once per process. The selected backend indexes the kernel
//! table in [`crate::kernels`], so conversion entry points only do a table
//! lookup after initialization.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

/// Kernel family used by the conversion entry points
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConvertBackend {
    /// Best available, in the order Apple Accelerate, AVX2, NEON, CPU
    Auto = 0,
    Cpu = 1,
    Avx2 = 2,
    Neon = 3,
    AppleAccelerate = 4,
}

impl ConvertBackend {
    const fn from_u8(value: u8) -> ConvertBackend {
        match value {
            1 => ConvertBackend::Cpu,
            2 => ConvertBackend::Avx2,
            3 => ConvertBackend::Neon,
            4 => ConvertBackend::AppleAccelerate,
            _ => ConvertBackend::Auto,
        }
    }

    /// Slot in the kernel table. `Auto` has no slot of its own.
    pub(crate) const fn table_index(self) -> usize {
        match self {
            ConvertBackend::Auto | ConvertBackend::Cpu => 0,
            ConvertBackend::Avx2 => 1,
            ConvertBackend::Neon => 2,
            ConvertBackend::AppleAccelerate => 3,
        }
    }
}

impl fmt::Display for ConvertBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConvertBackend::Auto => "Auto",
            ConvertBackend::Cpu => "CPU",
            ConvertBackend::Avx2 => "AVX2",
            ConvertBackend::Neon => "NEON",
            ConvertBackend::AppleAccelerate => "AppleAccelerate",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Capabilities {
    pub avx2: bool,
    pub neon: bool,
    pub accelerate: bool,
}

impl Capabilities {
    pub(crate) fn global() -> &'static Capabilities {
        static INSTANCE: OnceLock<Capabilities> = OnceLock::new();
        INSTANCE.get_or_init(Capabilities::probe)
    }

    fn probe() -> Capabilities {
        #[cfg(target_arch = "x86_64")]
        let avx2 = is_x86_feature_detected!("avx2");
        #[cfg(not(target_arch = "x86_64"))]
        let avx2 = false;

        #[cfg(target_arch = "aarch64")]
        let neon = std::arch::is_aarch64_feature_detected!("neon");
        #[cfg(not(target_arch = "aarch64"))]
        let neon = false;

        let caps = Capabilities {
            avx2,
            neon,
            accelerate: cfg!(target_os = "macos"),
        };
        log::info!(
            "conversion capabilities: avx2={} neon={} accelerate={}",
            caps.avx2,
            caps.neon,
            caps.accelerate
        );
        caps
    }

    /// Best backend in priority order
    pub(crate) fn best(&self) -> ConvertBackend {
        if self.accelerate {
            ConvertBackend::AppleAccelerate
        } else if self.avx2 {
            ConvertBackend::Avx2
        } else if self.neon {
            ConvertBackend::Neon
        } else {
            ConvertBackend::Cpu
        }
    }

    /// Best instruction-set backend, skipping library-backed ones
    #[cfg(target_os = "macos")]
    pub(crate) fn best_isa(&self) -> ConvertBackend {
        if self.avx2 {
            ConvertBackend::Avx2
        } else if self.neon {
            ConvertBackend::Neon
        } else {
            ConvertBackend::Cpu
        }
    }

    pub(crate) fn supports(&self, backend: ConvertBackend) -> bool {
        match backend {
            ConvertBackend::Auto | ConvertBackend::Cpu => true,
            ConvertBackend::Avx2 => self.avx2,
            ConvertBackend::Neon => self.neon,
            ConvertBackend::AppleAccelerate => self.accelerate,
        }
    }
}

static REQUESTED_BACKEND: AtomicU8 = AtomicU8::new(ConvertBackend::Auto as u8);

/// Whether `backend` can run on this machine
pub fn is_backend_available(backend: ConvertBackend) -> bool {
    Capabilities::global().supports(backend)
}

/// Backend the conversion entry points currently use. Never returns `Auto`.
pub fn convert_backend() -> ConvertBackend {
    resolve_backend(ConvertBackend::from_u8(
        REQUESTED_BACKEND.load(Ordering::Relaxed),
    ))
}

/// Force a backend for all subsequent conversions.
///
/// Returns false and keeps the current selection when `backend` is not
/// available. `Auto` restores the probed default.
pub fn set_convert_backend(backend: ConvertBackend) -> bool {
    if !is_backend_available(backend) {
        log::warn!("conversion backend {} is not available", backend);
        return false;
    }
    REQUESTED_BACKEND.store(backend as u8, Ordering::Relaxed);
    log::info!("conversion backend set to {}", resolve_backend(backend));
    true
}

pub(crate) fn resolve_backend(backend: ConvertBackend) -> ConvertBackend {
    match backend {
        ConvertBackend::Auto => Capabilities::global().best(),
        other => other,
    }
}

/// One-line summary of the probe result, e.g. `{backend:AVX2,avx2:true,neon:false,accelerate:false}`
pub fn describe_acceleration() -> String {
    let caps = Capabilities::global();
    format!(
        "{{backend:{},avx2:{},neon:{},accelerate:{}}}",
        convert_backend(),
        caps.avx2,
        caps.neon,
        caps.accelerate
    )
}
