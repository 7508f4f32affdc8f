// 该文件是 Facelite （轻量人脸推理） 项目的一部分。
// src/output/log_output.rs - 日志输出
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

use std::convert::Infallible;

use tracing::info;

use crate::{FromUrl, FromUrlWithScheme, model::Recognition, output::Render};

/// 通过 tracing 打印识别结果
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOutput;

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = Infallible;

  fn from_url(_url: &url::Url) -> Result<Self, Self::Error> {
    Ok(LogOutput)
  }
}

impl<F> Render<F, Vec<Recognition>> for LogOutput {
  type Error = Infallible;

  fn render_result(&self, _frame: &F, result: &Vec<Recognition>) -> Result<(), Self::Error> {
    for rec in result {
      match rec.embedding() {
        Some(embedding) => info!(
          "[{}] {}: 特征向量 {} 维, 前几项 {:?}",
          rec.id,
          rec.label,
          embedding.len(),
          &embedding[..embedding.len().min(4)]
        ),
        None => info!(
          "[{}] {}: {:.2}% at ({:.0}, {:.0}, {:.0}, {:.0})",
          rec.id,
          rec.label,
          rec.score * 100.0,
          rec.bbox.left,
          rec.bbox.top,
          rec.bbox.right,
          rec.bbox.bottom
        ),
      }
    }
    Ok(())
  }
}
