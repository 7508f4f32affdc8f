// 该文件是 Facelite （轻量人脸推理） 项目的一部分。
// src/output/json_output.rs - JSON Lines 输出
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

use std::{
  fs::OpenOptions,
  io::Write,
  path::{Path, PathBuf},
};

use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, model::Recognition, output::Render};

#[derive(Error, Debug)]
pub enum JsonOutputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 每次推理追加一行 JSON；路径为空时写到标准输出
#[derive(Debug, Clone)]
pub struct JsonOutput {
  path: Option<PathBuf>,
}

impl FromUrlWithScheme for JsonOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonOutput {
  type Error = JsonOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(JsonOutputError::SchemeMismatch(format!(
        "期望输出方式 '{}', 实际输出方式 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let path = match url.path() {
      "" | "-" | "/-" => None,
      path => Some(PathBuf::from(path)),
    };
    Ok(JsonOutput { path })
  }
}

pub fn recognition_to_json(rec: &Recognition) -> Value {
  json!({
    "id": rec.id,
    "label": rec.label,
    "score": rec.score,
    "box": [rec.bbox.left, rec.bbox.top, rec.bbox.right, rec.bbox.bottom],
    "embedding": rec.embedding(),
  })
}

impl JsonOutput {
  pub fn to_stdout() -> Self {
    Self { path: None }
  }

  pub fn to_file(path: impl Into<PathBuf>) -> Self {
    Self {
      path: Some(path.into()),
    }
  }

  fn append_line(&self, line: &str) -> Result<(), JsonOutputError> {
    match &self.path {
      Some(path) => {
        if let Some(parent) = Path::new(path).parent()
          && !parent.as_os_str().is_empty()
        {
          std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;
        debug!("写入识别结果到文件: {}", path.display());
      }
      None => {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", line)?;
      }
    }
    Ok(())
  }
}

impl<F> Render<F, Vec<Recognition>> for JsonOutput {
  type Error = JsonOutputError;

  fn render_result(&self, _frame: &F, result: &Vec<Recognition>) -> Result<(), Self::Error> {
    let records: Vec<Value> = result.iter().map(recognition_to_json).collect();
    let line = serde_json::to_string(&records)?;
    self.append_line(&line)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::BoundingBox;

  #[test]
  fn appends_one_line_per_render() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("result.jsonl");
    let output = JsonOutput::to_file(&path);

    let rec = Recognition {
      id: "3".to_string(),
      label: "face".to_string(),
      score: 0.75,
      bbox: BoundingBox::new(1.0, 2.0, 3.0, 4.0),
      embedding: None,
    };
    output.render_result(&(), &vec![rec.clone()]).unwrap();
    output.render_result(&(), &vec![rec]).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);

    let parsed: Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(parsed[0]["id"], "3");
    assert_eq!(parsed[0]["label"], "face");
    assert_eq!(parsed[0]["box"], json!([1.0, 2.0, 3.0, 4.0]));
    assert!(parsed[0]["embedding"].is_null());
  }

  #[test]
  fn dash_path_means_stdout() {
    let output = JsonOutput::from_url(&Url::parse("json:-").unwrap()).unwrap();
    assert!(output.path.is_none());
  }
}
