// 该文件是 Facelite （轻量人脸推理） 项目的一部分。
// src/input.rs - 图像文件输入
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

use image::{ImageReader, RgbImage, imageops::FilterType};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::ArgbFrame};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像加载错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("参数 size 的值无效: {0}")]
  InvalidSize(String),
}

/// 读取单张图像，缩放到模型的输入边长后作为一帧输出
pub struct ImageFileInput {
  image: Option<RgbImage>,
  size: Option<u32>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  /// `image:///path/to/face.jpg?size=112`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemeMismatch);
    }

    let mut size = None;
    for (key, value) in url.query_pairs() {
      if key == "size" {
        size = Some(
          value
            .parse()
            .map_err(|_| ImageFileInputError::InvalidSize(value.to_string()))?,
        );
      }
    }

    let image = ImageReader::open(url.path())?.decode()?;
    debug!("读取图像: {} ({}x{})", url.path(), image.width(), image.height());

    Ok(ImageFileInput {
      image: Some(image.into()),
      size,
    })
  }
}

impl ImageFileInput {
  pub fn from_image(image: RgbImage) -> Self {
    Self {
      image: Some(image),
      size: None,
    }
  }

  /// URL 中已给出 size 时以 URL 为准
  pub fn with_size(mut self, size: usize) -> Result<Self, ImageFileInputError> {
    if self.size.is_none() {
      let size =
        u32::try_from(size).map_err(|_| ImageFileInputError::InvalidSize(size.to_string()))?;
      self.size = Some(size);
    }
    Ok(self)
  }

  pub fn into_frames(self) -> ImageFileFrames {
    ImageFileFrames { inner: self }
  }
}

pub struct ImageFileFrames {
  inner: ImageFileInput,
}

impl Iterator for ImageFileFrames {
  type Item = ArgbFrame;

  fn next(&mut self) -> Option<Self::Item> {
    let image = self.inner.image.take()?;
    let image = match self.inner.size {
      Some(size) if image.dimensions() != (size, size) => {
        image::imageops::resize(&image, size, size, FilterType::Triangle)
      }
      _ => image,
    };
    Some(ArgbFrame::from(image))
  }
}

impl From<RgbImage> for ArgbFrame {
  fn from(image: RgbImage) -> Self {
    let (width, height) = image.dimensions();
    let pixels = image
      .pixels()
      .map(|p| 0xFF00_0000 | (p[0] as u32) << 16 | (p[1] as u32) << 8 | p[2] as u32)
      .collect();
    ArgbFrame::new(width as usize, height as usize, pixels)
  }
}
