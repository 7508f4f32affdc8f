// 该文件是 Facelite （轻量人脸推理） 项目的一部分。
// src/model/embedder.rs - 浮点特征模型后处理
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

use tracing::debug;

use super::Embedding;
use crate::engine::{EngineError, OutputBuffer, OutputMap};

pub const DEFAULT_EMBEDDING_LEN: usize = 512;
/// 特征结果没有检测语义，分数固定为最大值
pub const EMBEDDING_SCORE: f32 = f32::MAX;

pub(super) fn output_buffers(len: usize) -> Vec<OutputBuffer> {
  vec![OutputBuffer::zeros(&[1, len])]
}

pub(super) fn decode(outputs: &OutputMap) -> Result<Embedding, EngineError> {
  let vector = outputs
    .first()
    .map(|buffer| Box::<[f32]>::from(buffer.data()))
    .ok_or_else(|| EngineError::inference("缺少特征输出"))?;
  debug!("特征向量长度: {}", vector.len());
  Ok(Embedding { vector })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn embedding_copies_raw_vector() {
    let mut buffers = output_buffers(4);
    buffers[0].copy_from(0, &[1, 4], &[0.1, -0.2, 0.3, -0.4]).unwrap();

    let embedding = decode(&buffers).unwrap();
    assert_eq!(&*embedding.vector, &[0.1, -0.2, 0.3, -0.4]);
  }

  #[test]
  fn default_length_is_512() {
    let buffers = output_buffers(DEFAULT_EMBEDDING_LEN);
    assert_eq!(buffers[0].shape(), &[1, 512]);
  }
}
