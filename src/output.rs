// 该文件是 Facelite （轻量人脸推理） 项目的一部分。
// src/output.rs - 输出定义
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

use crate::FromUrl;
use crate::FromUrlWithScheme;
use crate::model::Recognition;
use thiserror::Error;
use url::Url;

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

mod json_output;
pub use self::json_output::{JsonOutput, JsonOutputError};

mod log_output;
pub use self::log_output::LogOutput;

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("JSON 输出错误: {0}")]
  JsonOutputError(#[from] JsonOutputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum OutputWrapper {
  Json(JsonOutput),
  Log(LogOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      JsonOutput::SCHEME => Ok(OutputWrapper::Json(JsonOutput::from_url(url)?)),
      LogOutput::SCHEME => Ok(OutputWrapper::Log(LogOutput)),
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl<F> Render<F, Vec<Recognition>> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, frame: &F, result: &Vec<Recognition>) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Json(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      OutputWrapper::Log(output) => {
        let Ok(()) = output.render_result(frame, result);
        Ok(())
      }
    }
  }
}
