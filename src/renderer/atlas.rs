//! Guillotine packing of small textures into one shared atlas surface.
//!
//! Small textures are copied into a single large texture so runs of quads
//! sampling different sources can still share one bind. Each entry reserves
//! a 1px border on every side; uploads replicate the edge pixels into that
//! border so bilinear filtering at entry edges never samples a neighbor.
//!
//! Freed entries are not coalesced back into the free list. Their area is
//! counted as waste, and once waste crosses a fraction of the surface the
//! whole atlas is repacked from the set of still-active entries.

use std::collections::HashMap;

use crate::texture::{TextureHandle, WHITE_TEXTURE};

/// Side length of the shared atlas surface, in pixels.
pub const ATLAS_SIZE: u32 = 2048;

/// Largest texture dimension considered for atlasing; bigger textures are
/// bound individually.
pub const MAX_ATLAS_DIM: u32 = 256;

/// Reserved border on each side of an entry.
const BORDER: u32 = 1;

/// Repack when `wasted * WASTE_DIVISOR` exceeds the atlas area.
const WASTE_DIVISOR: u64 = 8;

/// Minimum frames between repacks; high churn degrades to extra binds
/// instead of repacking every frame.
const DEFRAG_MIN_FRAMES: u64 = 300;

/// Content placement of an entry, border excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// A pending copy of a source texture into its atlas region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtlasUpload {
    pub source: TextureHandle,
    pub region: AtlasRegion,
}

impl AtlasUpload {
    /// Geometry for one upload: the body plus four edge strips and four
    /// corner patches filling the reserved border with edge-replicated
    /// pixels. Destination rectangles are atlas pixels `[x, y, w, h]`;
    /// sources are normalized texel-center-clamped coordinate rectangles
    /// `[u0, v0, u1, v1]`.
    pub fn sub_quads(&self) -> [([f32; 4], [f32; 4]); 9] {
        let AtlasRegion {
            x,
            y,
            width: w,
            height: h,
        } = self.region;
        let (x, y, w, h) = (x as f32, y as f32, w as f32, h as f32);
        // Clamp border sampling to the first/last texel centers.
        let hu = 0.5 / w;
        let hv = 0.5 / h;
        [
            // Body.
            ([x, y, w, h], [0.0, 0.0, 1.0, 1.0]),
            // Edge strips.
            ([x, y - 1.0, w, 1.0], [0.0, hv, 1.0, hv]),
            ([x, y + h, w, 1.0], [0.0, 1.0 - hv, 1.0, 1.0 - hv]),
            ([x - 1.0, y, 1.0, h], [hu, 0.0, hu, 1.0]),
            ([x + w, y, 1.0, h], [1.0 - hu, 0.0, 1.0 - hu, 1.0]),
            // Corner patches.
            ([x - 1.0, y - 1.0, 1.0, 1.0], [hu, hv, hu, hv]),
            ([x + w, y - 1.0, 1.0, 1.0], [1.0 - hu, hv, 1.0 - hu, hv]),
            ([x - 1.0, y + h, 1.0, 1.0], [hu, 1.0 - hv, hu, 1.0 - hv]),
            (
                [x + w, y + h, 1.0, 1.0],
                [1.0 - hu, 1.0 - hv, 1.0 - hu, 1.0 - hv],
            ),
        ]
    }
}

#[derive(Debug, Clone, Copy)]
struct FreeRect {
    x: u32,
    y: u32,
    w: u32,
    h: u32,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    region: AtlasRegion,
    active: bool,
}

/// Best-fit guillotine packer over the shared surface.
#[derive(Debug)]
pub struct TextureAtlasPacker {
    size: u32,
    free: Vec<FreeRect>,
    entries: HashMap<TextureHandle, Entry>,
    /// Upper bound on the tallest free rectangle, tightened on every full
    /// scan; lets oversized requests fail without scanning.
    max_free_h: u32,
    wasted: u64,
    defrag_wanted: bool,
    last_defrag_frame: u64,
    pending: Vec<AtlasUpload>,
    cleared: bool,
}

impl TextureAtlasPacker {
    pub fn new(size: u32) -> Self {
        Self {
            size,
            free: vec![FreeRect {
                x: 0,
                y: 0,
                w: size,
                h: size,
            }],
            entries: HashMap::new(),
            max_free_h: size,
            wasted: 0,
            defrag_wanted: false,
            last_defrag_frame: 0,
            pending: Vec::new(),
            cleared: false,
        }
    }

    /// Whether a texture of these content dimensions is worth atlasing.
    pub fn eligible(width: u32, height: u32) -> bool {
        width > 0 && height > 0 && width <= MAX_ATLAS_DIM && height <= MAX_ATLAS_DIM
    }

    /// Content region of a packed texture, if resident.
    pub fn get(&self, handle: TextureHandle) -> Option<AtlasRegion> {
        self.entries
            .get(&handle)
            .filter(|e| e.active)
            .map(|e| e.region)
    }

    pub fn occupancy(&self) -> usize {
        self.entries.values().filter(|e| e.active).count()
    }

    /// Pack a texture's content rectangle, reserving the 1px border around
    /// it. Returns the content region, or `None` when no free rectangle
    /// fits (flagging that a repack would help).
    pub fn add(&mut self, handle: TextureHandle, width: u32, height: u32) -> Option<AtlasRegion> {
        let region = self.place(width, height)?;
        self.entries.insert(
            handle,
            Entry {
                region,
                active: true,
            },
        );
        self.pending.push(AtlasUpload {
            source: handle,
            region,
        });
        Some(region)
    }

    /// Release an entry. The rectangle stays unusable until the next
    /// repack; its footprint counts toward the defrag threshold.
    pub fn remove(&mut self, handle: TextureHandle) {
        if let Some(entry) = self.entries.get_mut(&handle) {
            if entry.active {
                entry.active = false;
                let fw = (entry.region.width + 2 * BORDER) as u64;
                let fh = (entry.region.height + 2 * BORDER) as u64;
                self.wasted += fw * fh;
                self.pending.retain(|u| u.source != handle);
            }
        }
    }

    /// Per-frame maintenance: repack when enough waste has accumulated,
    /// rate-limited so sustained churn cannot trigger a repack storm.
    /// Returns true when a repack happened this frame.
    pub fn maintain(&mut self, frame: u64) -> bool {
        let area = self.size as u64 * self.size as u64;
        let over_threshold = self.wasted * WASTE_DIVISOR > area;
        if !(over_threshold || (self.defrag_wanted && self.wasted > 0)) {
            return false;
        }
        if frame.saturating_sub(self.last_defrag_frame) < DEFRAG_MIN_FRAMES {
            return false;
        }
        self.repack();
        self.last_defrag_frame = frame;
        true
    }

    /// Uploads accumulated since the last flush, plus whether the surface
    /// must be cleared first (set after a repack).
    pub fn flush_uploads(&mut self) -> (Vec<AtlasUpload>, bool) {
        let cleared = self.cleared;
        self.cleared = false;
        (std::mem::take(&mut self.pending), cleared)
    }

    fn place(&mut self, width: u32, height: u32) -> Option<AtlasRegion> {
        let fw = width + 2 * BORDER;
        let fh = height + 2 * BORDER;
        if fw > self.size || fh > self.max_free_h {
            self.defrag_wanted = true;
            return None;
        }

        let mut tallest = 0;
        let mut best: Option<usize> = None;
        let mut best_area = u64::MAX;
        for (i, rect) in self.free.iter().enumerate() {
            tallest = tallest.max(rect.h);
            if rect.w >= fw && rect.h >= fh {
                let area = rect.w as u64 * rect.h as u64;
                if area < best_area {
                    best_area = area;
                    best = Some(i);
                }
            }
        }
        self.max_free_h = tallest;

        let Some(i) = best else {
            self.defrag_wanted = true;
            log::debug!("atlas full for {}x{} request", width, height);
            return None;
        };

        let rect = self.free.swap_remove(i);
        // Guillotine split: remainder to the right at the occupied height,
        // remainder below at the full original width.
        if rect.w > fw {
            self.push_free(FreeRect {
                x: rect.x + fw,
                y: rect.y,
                w: rect.w - fw,
                h: fh,
            });
        }
        if rect.h > fh {
            self.push_free(FreeRect {
                x: rect.x,
                y: rect.y + fh,
                w: rect.w,
                h: rect.h - fh,
            });
        }

        Some(AtlasRegion {
            x: rect.x + BORDER,
            y: rect.y + BORDER,
            width,
            height,
        })
    }

    fn push_free(&mut self, rect: FreeRect) {
        self.max_free_h = self.max_free_h.max(rect.h);
        self.free.push(rect);
    }

    /// Clear the surface and re-add every active entry. The white pixel
    /// goes back first so its coordinates survive every repack.
    fn repack(&mut self) {
        let mut survivors: Vec<(TextureHandle, u32, u32)> = self
            .entries
            .iter()
            .filter(|(_, e)| e.active)
            .map(|(&handle, e)| (handle, e.region.width, e.region.height))
            .collect();
        survivors.sort_by_key(|&(handle, _, _)| (handle != WHITE_TEXTURE, handle.0));

        self.entries.clear();
        self.pending.clear();
        self.free.clear();
        self.free.push(FreeRect {
            x: 0,
            y: 0,
            w: self.size,
            h: self.size,
        });
        self.max_free_h = self.size;
        self.wasted = 0;
        self.defrag_wanted = false;
        self.cleared = true;

        let count = survivors.len();
        for (handle, width, height) in survivors {
            if self.add(handle, width, height).is_none() {
                // Cannot happen unless the active set alone overflows the
                // surface; the entry falls back to its own bind.
                log::error!("atlas repack could not refit {}x{} entry", width, height);
            }
        }
        log::info!("atlas repacked, {} entries resident", count);
    }
}

impl Default for TextureAtlasPacker {
    fn default() -> Self {
        Self::new(ATLAS_SIZE)
    }
}
