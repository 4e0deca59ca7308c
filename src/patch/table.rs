use std::collections::HashMap;

use tracing::{debug, info};

use crate::error::Result;
use crate::image::ImageInfo;
use crate::patch::encode::ControlTransfer;
use crate::patch::ops::{fill_nops, insert_control_transfer};
use crate::version::BuildIdentity;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchAction {
    Nops,
    Transfer { kind: ControlTransfer, target: usize },
}

/// One modification of the host image, relative to its base address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatchSite {
    pub offset: u32,
    pub size: usize,
    pub action: PatchAction,
}

impl PatchSite {
    pub fn nops(offset: u32, size: usize) -> Self {
        Self { offset, size, action: PatchAction::Nops }
    }

    pub fn transfer(offset: u32, size: usize, kind: ControlTransfer, target: usize) -> Self {
        Self { offset, size, action: PatchAction::Transfer { kind, target } }
    }

    /// # Safety
    ///
    /// `image` must describe the module being patched and the site must lie in its code.
    pub unsafe fn apply(&self, image: &ImageInfo) -> Result<()> {
        let address = image.offset(self.offset) as *mut u8;
        match self.action {
            PatchAction::Nops => fill_nops(address, self.size),
            PatchAction::Transfer { kind, target } => {
                insert_control_transfer(address, self.size, target, kind)
            }
        }
    }
}

/// Patch sites per build, applied in insertion order.
#[derive(Clone, Debug, Default)]
pub struct PatchTable {
    sites: HashMap<BuildIdentity, Vec<PatchSite>>,
}

impl PatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, build: BuildIdentity, site: PatchSite) -> Self {
        self.push(build, site);
        self
    }

    /// Adds `site` to every build in `builds`.
    pub fn with_all(mut self, builds: &[BuildIdentity], site: PatchSite) -> Self {
        for build in builds {
            self.push(*build, site);
        }
        self
    }

    pub fn push(&mut self, build: BuildIdentity, site: PatchSite) {
        self.sites.entry(build).or_default().push(site);
    }

    pub fn sites(&self, build: BuildIdentity) -> &[PatchSite] {
        self.sites.get(&build).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Identifies the build behind `image` and applies its sites, stopping at the first
    /// failure.
    ///
    /// # Safety
    ///
    /// `image` must describe a module mapped into this process whose code matches the
    /// sites recorded for its build.
    pub unsafe fn apply(&self, image: &ImageInfo) -> Result<BuildIdentity> {
        let build = BuildIdentity::require(image.fingerprint())?;
        info!("Patching build {} ({} sites)", build, self.sites(build).len());

        for site in self.sites(build) {
            debug!(offset = format_args!("{:#x}", site.offset), size = site.size, action = ?site.action, "applying site");
            site.apply(image)?;
        }

        Ok(build)
    }
}
