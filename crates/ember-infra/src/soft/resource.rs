// Copyright 2025 Ember Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! In-memory storage objects behind the software backend's handles.

use crate::soft::stats::SoftStats;
use ember_core::api::ResourceFormat;
use ember_core::descriptor::{DescriptorPoolDesc, ShaderVisibility};
use ember_core::error::DeviceError;
use ember_core::query::QueryType;
use ember_core::resource::{BufferDesc, TextureDesc};
use ember_core::traits::{ApiObject, ApiObjectHandle, DescriptorArena, PageMemory, SwapChain};
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Texture storage: one tightly packed byte vector per subresource.
#[derive(Debug)]
pub(crate) struct SoftTexture {
    pub(crate) desc: TextureDesc,
    pub(crate) subresources: Mutex<Vec<Vec<u8>>>,
}

impl SoftTexture {
    pub(crate) fn new(desc: &TextureDesc) -> Self {
        let bpp = desc.format.bytes_per_pixel() as usize;
        let mut subresources = Vec::with_capacity(desc.subresource_count() as usize);
        for _slice in 0..desc.array_size {
            for mip in 0..desc.mip_levels {
                let width = (desc.width >> mip).max(1) as usize;
                let height = (desc.height >> mip).max(1) as usize;
                subresources.push(vec![0u8; width * height * bpp]);
            }
        }
        Self {
            desc: desc.clone(),
            subresources: Mutex::new(subresources),
        }
    }

    pub(crate) fn subresource_index(&self, array_slice: u32, mip_level: u32) -> usize {
        (array_slice * self.desc.mip_levels + mip_level) as usize
    }

    pub(crate) fn mip_extent(&self, mip_level: u32) -> (usize, usize) {
        (
            (self.desc.width >> mip_level).max(1) as usize,
            (self.desc.height >> mip_level).max(1) as usize,
        )
    }

    pub(crate) fn format(&self) -> ResourceFormat {
        self.desc.format
    }
}

impl ApiObject for SoftTexture {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Buffer storage: one byte vector.
#[derive(Debug)]
pub(crate) struct SoftBuffer {
    pub(crate) desc: BufferDesc,
    pub(crate) data: Mutex<Vec<u8>>,
}

impl SoftBuffer {
    pub(crate) fn new(desc: &BufferDesc) -> Self {
        Self {
            desc: desc.clone(),
            data: Mutex::new(vec![0u8; desc.size as usize]),
        }
    }
}

impl ApiObject for SoftBuffer {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// One CPU-visible heap page.
#[derive(Debug)]
pub(crate) struct SoftPage {
    pub(crate) bytes: Mutex<Vec<u8>>,
}

impl SoftPage {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            bytes: Mutex::new(vec![0u8; size]),
        }
    }
}

impl ApiObject for SoftPage {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl PageMemory for SoftPage {
    fn len(&self) -> usize {
        self.bytes.lock().unwrap().len()
    }

    fn write(&self, offset: usize, data: &[u8]) {
        let mut bytes = self.bytes.lock().unwrap();
        bytes[offset..offset + data.len()].copy_from_slice(data);
    }

    fn read(&self, offset: usize, out: &mut [u8]) {
        let bytes = self.bytes.lock().unwrap();
        out.copy_from_slice(&bytes[offset..offset + out.len()]);
    }
}

/// Descriptor storage. The core pool owns all slot bookkeeping; this arena
/// only records what it was created for.
#[derive(Debug)]
pub(crate) struct SoftArena {
    visibility: ShaderVisibility,
    #[allow(dead_code)]
    desc: DescriptorPoolDesc,
}

impl SoftArena {
    pub(crate) fn new(visibility: ShaderVisibility, desc: &DescriptorPoolDesc) -> Self {
        Self {
            visibility,
            desc: desc.clone(),
        }
    }
}

impl DescriptorArena for SoftArena {
    fn visibility(&self) -> ShaderVisibility {
        self.visibility
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Query heap storage; timestamp slots record a monotonic tick.
#[derive(Debug)]
pub(crate) struct SoftQueryHeap {
    #[allow(dead_code)]
    pub(crate) ty: QueryType,
    pub(crate) timestamps: Mutex<Vec<u64>>,
}

impl SoftQueryHeap {
    pub(crate) fn new(ty: QueryType, count: u32) -> Self {
        Self {
            ty,
            timestamps: Mutex::new(vec![0; count as usize]),
        }
    }
}

impl ApiObject for SoftQueryHeap {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The rotating presentable image set.
#[derive(Debug)]
pub(crate) struct SoftSwapChain {
    format: ResourceFormat,
    image_count: u32,
    images: Mutex<Vec<Arc<SoftTexture>>>,
    next: AtomicU32,
    vsync: AtomicBool,
    stats: Arc<SoftStats>,
}

impl SoftSwapChain {
    pub(crate) fn new(
        width: u32,
        height: u32,
        format: ResourceFormat,
        image_count: u32,
        vsync: bool,
        stats: Arc<SoftStats>,
    ) -> Self {
        Self {
            format,
            image_count,
            images: Mutex::new(Self::build_images(width, height, format, image_count)),
            next: AtomicU32::new(0),
            vsync: AtomicBool::new(vsync),
            stats,
        }
    }

    fn build_images(
        width: u32,
        height: u32,
        format: ResourceFormat,
        image_count: u32,
    ) -> Vec<Arc<SoftTexture>> {
        (0..image_count)
            .map(|_| {
                Arc::new(SoftTexture::new(&TextureDesc::new_2d(
                    width,
                    height,
                    format,
                    ember_core::resource::BindFlags::RENDER_TARGET,
                )))
            })
            .collect()
    }
}

impl SwapChain for SoftSwapChain {
    fn image_count(&self) -> u32 {
        self.image_count
    }

    fn image(&self, index: u32) -> ApiObjectHandle {
        self.images.lock().unwrap()[index as usize].clone()
    }

    fn present(&self) -> Result<(), DeviceError> {
        SoftStats::bump(&self.stats.presents);
        Ok(())
    }

    fn acquire_next_image(&self) -> Result<u32, DeviceError> {
        let index = self.next.load(Ordering::SeqCst);
        self.next
            .store((index + 1) % self.image_count, Ordering::SeqCst);
        Ok(index)
    }

    fn resize(&self, width: u32, height: u32) -> Result<(), DeviceError> {
        let mut images = self.images.lock().unwrap();
        *images = Self::build_images(width, height, self.format, self.image_count);
        self.next.store(0, Ordering::SeqCst);
        Ok(())
    }

    fn set_vsync(&self, enabled: bool) {
        self.vsync.store(enabled, Ordering::SeqCst);
    }
}
