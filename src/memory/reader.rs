//! Signature scan and snapshot decoding over an abstract process handle

use std::time::Instant;
use thiserror::Error;

use super::snapshot::{CameraTransform, GameSnapshot};
use crate::geometry::{wrap_angle, Vec3};
use crate::utils::settings::MemoryLayout;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryReadError {
    #[error("target process is not available")]
    ProcessUnavailable,
    #[error("module {0} not found in target process")]
    ModuleNotFound(String),
    #[error("read of {len} bytes at {address:#x} is out of bounds")]
    OutOfBounds { address: u64, len: usize },
    #[error("read of {len} bytes at {address:#x} failed: {reason}")]
    ReadFailed {
        address: u64,
        len: usize,
        reason: String,
    },
    #[error("invalid signature pattern: {0}")]
    InvalidSignature(String),
    #[error("player signature not found in module")]
    SignatureNotFound,
    #[error("pointer {0:#x} is not a valid entity address")]
    InvalidPointer(u64),
    #[error("memory layout mismatch: {0}")]
    LayoutMismatch(String),
    #[error("memory read timed out")]
    Timeout,
}

/// Loaded module bounds inside the target process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleInfo {
    pub base: u64,
    pub size: usize,
}

/// Raw read access to a live process
pub trait ProcessMemory: Send {
    /// Fill `buf` from `address`; partial reads are errors
    fn read(&self, address: u64, buf: &mut [u8]) -> Result<(), MemoryReadError>;

    fn module(&self, name: &str) -> Result<ModuleInfo, MemoryReadError>;
}

/// Hands out a handle to the target process, or `None` when it is not running
pub trait ProcessProvider: Send + Sync {
    fn open_target(&self) -> Option<Box<dyn ProcessMemory>>;
}

/// Byte pattern with wildcards, e.g. `48 8B 05 ?? ?? ?? ??`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    bytes: Vec<Option<u8>>,
}

impl Signature {
    pub fn parse(pattern: &str) -> Result<Self, MemoryReadError> {
        let bytes = pattern
            .split_whitespace()
            .map(|tok| match tok {
                "?" | "??" => Ok(None),
                _ => u8::from_str_radix(tok, 16)
                    .map(Some)
                    .map_err(|_| MemoryReadError::InvalidSignature(pattern.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;
        if bytes.is_empty() {
            return Err(MemoryReadError::InvalidSignature(pattern.to_string()));
        }
        Ok(Self { bytes })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn matches_at(&self, haystack: &[u8], pos: usize) -> bool {
        haystack.len() >= pos + self.bytes.len()
            && self
                .bytes
                .iter()
                .zip(&haystack[pos..])
                .all(|(p, b)| p.map_or(true, |p| p == *b))
    }

    /// Offsets of every match starting before `limit`
    pub fn find_all<'a>(&'a self, haystack: &'a [u8], limit: usize) -> impl Iterator<Item = usize> + 'a {
        let end = limit.min(haystack.len().saturating_sub(self.bytes.len() - 1));
        (0..end).filter(move |&pos| self.matches_at(haystack, pos))
    }
}

/// Connected reader for the local player entity
pub struct MemoryReader {
    process: Box<dyn ProcessMemory>,
    layout: MemoryLayout,
    player: u64,
    seq: u64,
}

impl std::fmt::Debug for MemoryReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryReader")
            .field("player", &format_args!("{:#x}", self.player))
            .field("seq", &self.seq)
            .finish()
    }
}

impl MemoryReader {
    /// Locate the player entity by scanning `module_name` for the layout's signature
    pub fn connect(
        process: Box<dyn ProcessMemory>,
        module_name: &str,
        layout: MemoryLayout,
    ) -> Result<Self, MemoryReadError> {
        let signature = Signature::parse(&layout.signature)?;
        if layout.rel_offset + 4 > signature.len() {
            return Err(MemoryReadError::LayoutMismatch(
                "rel32 operand lies outside the signature".to_string(),
            ));
        }
        let module = process.module(module_name)?;
        tracing::debug!(
            "[MEM] Scanning {} at {:#x} ({} bytes)",
            module_name,
            module.base,
            module.size
        );

        let chunk = layout.scan_chunk.max(signature.len() * 2);
        let mut buf = Vec::new();
        let mut offset = 0usize;
        while offset < module.size {
            // Overlap chunks so a match straddling the boundary is still seen
            let len = (chunk + signature.len() - 1).min(module.size - offset);
            buf.resize(len, 0);
            process.read(module.base + offset as u64, &mut buf)?;

            for pos in signature.find_all(&buf, chunk) {
                let site = module.base + (offset + pos) as u64;
                match resolve_player(process.as_ref(), &layout, &buf[pos..], site) {
                    Ok(player) => {
                        tracing::info!("[MEM] Connected: player entity at {:#x}", player);
                        return Ok(Self {
                            process,
                            layout,
                            player,
                            seq: 0,
                        });
                    }
                    Err(e) => tracing::trace!("[MEM] Candidate at {:#x} rejected: {}", site, e),
                }
            }
            offset += chunk;
        }

        Err(MemoryReadError::SignatureNotFound)
    }

    pub fn player_address(&self) -> u64 {
        self.player
    }

    /// Read position, heading and transform of the player entity
    pub fn read_snapshot(&mut self, now: Instant) -> Result<GameSnapshot, MemoryReadError> {
        let right = self.read_vec3(self.layout.right_offset)?;
        let forward = self.read_vec3(self.layout.forward_offset)?;
        let up = self.read_vec3(self.layout.up_offset)?;
        let position = self.read_vec3(self.layout.position_offset)?;

        for (name, v) in [("right", right), ("forward", forward), ("up", up), ("position", position)] {
            if !v.is_finite() {
                return Err(MemoryReadError::LayoutMismatch(format!("{} row is not finite", name)));
            }
        }
        let planar = (forward.x as f64).hypot(forward.y as f64);
        if planar < 1e-3 {
            return Err(MemoryReadError::LayoutMismatch(
                "forward vector has no planar component".to_string(),
            ));
        }

        let heading = wrap_angle((forward.x as f64).atan2(forward.y as f64));
        self.seq += 1;
        Ok(GameSnapshot {
            position,
            heading,
            camera: CameraTransform {
                right,
                forward,
                up,
                translation: position,
            },
            seq: self.seq,
            captured_at: now,
        })
    }

    fn read_vec3(&self, offset: u64) -> Result<Vec3, MemoryReadError> {
        let mut raw = [0u8; 12];
        let address = self
            .player
            .checked_add(offset)
            .ok_or(MemoryReadError::InvalidPointer(self.player))?;
        self.process.read(address, &mut raw)?;
        let f = |i: usize| f32::from_le_bytes([raw[i], raw[i + 1], raw[i + 2], raw[i + 3]]);
        Ok(Vec3::new(f(0), f(4), f(8)))
    }
}

fn read_u64(process: &dyn ProcessMemory, address: u64) -> Result<u64, MemoryReadError> {
    let mut raw = [0u8; 8];
    process.read(address, &mut raw)?;
    Ok(u64::from_le_bytes(raw))
}

/// Follow `mov rax, [rip+rel32]` to the factory, then the factory's player field
fn resolve_player(
    process: &dyn ProcessMemory,
    layout: &MemoryLayout,
    code: &[u8],
    site: u64,
) -> Result<u64, MemoryReadError> {
    let r = layout.rel_offset;
    let rel = code
        .get(r..r + 4)
        .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(MemoryReadError::OutOfBounds {
            address: site,
            len: r + 4,
        })?;
    let rip = site
        .checked_add(layout.rip_offset as u64)
        .ok_or(MemoryReadError::InvalidPointer(site))?;
    let slot = rip.wrapping_add_signed(rel as i64);
    let factory = read_u64(process, slot)?;
    if factory < layout.min_valid_pointer {
        return Err(MemoryReadError::InvalidPointer(factory));
    }
    // pointers come from the target process and may hold anything
    let field = factory
        .checked_add(layout.player_offset)
        .ok_or(MemoryReadError::InvalidPointer(factory))?;
    let player = read_u64(process, field)?;
    if player < layout.min_valid_pointer {
        return Err(MemoryReadError::InvalidPointer(player));
    }
    Ok(player)
}
