// 该文件是 Facelite （轻量人脸推理） 项目的一部分。
// src/frame.rs - 输入帧与输入张量
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

pub const RGB_CHANNELS: usize = 3;

// 浮点模型各通道均值
pub const FIRST_CHANNEL_MEAN: f32 = 131.0912;
pub const SECOND_CHANNEL_MEAN: f32 = 103.8827;
pub const THIRD_CHANNEL_MEAN: f32 = 91.4953;

/// ARGB 像素帧，每个像素一个 `u32`，行优先
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgbFrame {
  width: usize,
  height: usize,
  pixels: Box<[u32]>,
}

impl ArgbFrame {
  pub fn new(width: usize, height: usize, pixels: Vec<u32>) -> Self {
    if pixels.len() != width * height {
      panic!(
        "数据长度不匹配: 期望长度 {}, 实际长度 {}",
        width * height,
        pixels.len()
      );
    }

    Self {
      width,
      height,
      pixels: pixels.into_boxed_slice(),
    }
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn pixels(&self) -> &[u32] {
    &self.pixels
  }
}

#[inline]
fn split_rgb(pixel: u32) -> (u8, u8, u8) {
  (
    ((pixel >> 16) & 0xFF) as u8,
    ((pixel >> 8) & 0xFF) as u8,
    (pixel & 0xFF) as u8,
  )
}

/// 模型输入张量，形状 `[1, size, size, 3]`，按平台字节序存放
///
/// 每次推理原地覆写，不重新分配。
#[derive(Debug, Clone)]
pub enum InputTensor {
  /// 量化模型：每通道 1 字节，R、G、B 顺序
  Quantized { size: usize, data: Box<[u8]> },
  /// 浮点模型：每通道 4 字节，B、G、R 顺序，减去通道均值
  Float { size: usize, data: Box<[f32]> },
}

impl InputTensor {
  pub fn quantized(size: usize) -> Self {
    InputTensor::Quantized {
      size,
      data: vec![0u8; size * size * RGB_CHANNELS].into_boxed_slice(),
    }
  }

  pub fn float(size: usize) -> Self {
    InputTensor::Float {
      size,
      data: vec![0f32; size * size * RGB_CHANNELS].into_boxed_slice(),
    }
  }

  pub fn size(&self) -> usize {
    match self {
      InputTensor::Quantized { size, .. } | InputTensor::Float { size, .. } => *size,
    }
  }

  pub fn bytes_per_channel(&self) -> usize {
    match self {
      InputTensor::Quantized { .. } => std::mem::size_of::<u8>(),
      InputTensor::Float { .. } => std::mem::size_of::<f32>(),
    }
  }

  pub fn shape(&self) -> [usize; 4] {
    let size = self.size();
    [1, size, size, RGB_CHANNELS]
  }

  pub fn byte_len(&self) -> usize {
    self.as_bytes().len()
  }

  /// 以平台字节序查看底层字节
  pub fn as_bytes(&self) -> &[u8] {
    match self {
      InputTensor::Quantized { data, .. } => &data[..],
      InputTensor::Float { data, .. } => {
        // SAFETY: f32 没有填充字节，u8 的对齐要求为 1，长度按字节换算
        unsafe {
          std::slice::from_raw_parts(
            data.as_ptr().cast::<u8>(),
            data.len() * std::mem::size_of::<f32>(),
          )
        }
      }
    }
  }

  /// 将 ARGB 像素写入张量。
  ///
  /// 前置条件：`width == height == self.size()` 且像素数量足够，由调用方保证。
  pub fn fill(&mut self, pixels: &[u32], width: usize, height: usize) {
    debug_assert_eq!(width, height);
    debug_assert_eq!(width, self.size());
    debug_assert!(pixels.len() >= width * height);

    match self {
      InputTensor::Quantized { size, data } => {
        let count = *size * *size;
        for (dst, &pixel) in data.chunks_exact_mut(RGB_CHANNELS).zip(&pixels[..count]) {
          let (r, g, b) = split_rgb(pixel);
          dst[0] = r;
          dst[1] = g;
          dst[2] = b;
        }
      }
      InputTensor::Float { size, data } => {
        let count = *size * *size;
        for (dst, &pixel) in data.chunks_exact_mut(RGB_CHANNELS).zip(&pixels[..count]) {
          let (r, g, b) = split_rgb(pixel);
          dst[0] = b as f32 - THIRD_CHANNEL_MEAN;
          dst[1] = g as f32 - SECOND_CHANNEL_MEAN;
          dst[2] = r as f32 - FIRST_CHANNEL_MEAN;
        }
      }
    }
  }

  pub fn fill_frame(&mut self, frame: &ArgbFrame) {
    self.fill(frame.pixels(), frame.width(), frame.height());
  }
}
