//! Device memory admission checks.
//!
//! Before loading each engine instance the pool asks a [`VramProbe`] how
//! much device memory is free; anything under [`MIN_FREE_VRAM_BYTES`]
//! aborts pool construction. The production probe shells out to
//! `nvidia-smi` so the server has no hard link-time dependency on the CUDA
//! toolkit; tests and CPU-only development use [`FixedProbe`].

use std::process::Command;

use anyhow::{bail, Context, Result};

/// Minimum free device memory required to admit one more engine instance.
pub const MIN_FREE_VRAM_BYTES: u64 = 500_000_000;

/// Reports free memory on a device.
pub trait VramProbe {
    fn free_bytes(&self, device_id: usize) -> Result<u64>;
}

/// Queries free memory through `nvidia-smi`.
#[derive(Debug, Default)]
pub struct NvidiaSmiProbe;

impl VramProbe for NvidiaSmiProbe {
    fn free_bytes(&self, device_id: usize) -> Result<u64> {
        let output = Command::new("nvidia-smi")
            .args([
                "--query-gpu=memory.free",
                "--format=csv,noheader,nounits",
                "-i",
            ])
            .arg(device_id.to_string())
            .output()
            .context("failed to run nvidia-smi; is the NVIDIA driver installed?")?;

        if !output.status.success() {
            bail!(
                "nvidia-smi exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_free_mib(&stdout)
    }
}

/// Parse the `memory.free` column (MiB) into bytes.
fn parse_free_mib(stdout: &str) -> Result<u64> {
    let line = stdout.trim();
    let mib: u64 = line
        .parse()
        .with_context(|| format!("unexpected nvidia-smi output: {line:?}"))?;
    Ok(mib * 1024 * 1024)
}

/// Probe returning a fixed value, for tests and CPU-only development.
#[derive(Debug)]
pub struct FixedProbe {
    free: u64,
}

impl FixedProbe {
    pub fn new(free: u64) -> Self {
        Self { free }
    }

    /// A probe that always passes the admission check.
    pub fn plenty() -> Self {
        Self { free: u64::MAX }
    }
}

impl VramProbe for FixedProbe {
    fn free_bytes(&self, _device_id: usize) -> Result<u64> {
        Ok(self.free)
    }
}
