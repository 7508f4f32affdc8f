// 该文件是 Facelite （轻量人脸推理） 项目的一部分。
// src/resource.rs - 模型与标签资源加载
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
  fs::File,
  io::{self, BufRead, BufReader, Read},
  path::{Path, PathBuf},
};

use memmap2::{Mmap, MmapOptions};
use thiserror::Error;
use tracing::{debug, info, warn};

/// 系统模型目录，资源包中找不到时的后备位置
pub const SYSTEM_MODEL_DIR: &str = "/system/etc/face";

#[derive(Error, Debug)]
pub enum ResourceError {
  #[error("资源 {name} 在资源包与 {system_dir} 中均未找到")]
  NotFound { name: String, system_dir: PathBuf },
  #[error("读取资源 {name} 失败: {source}")]
  Io {
    name: String,
    #[source]
    source: io::Error,
  },
}

/// 资源包中的文件描述：底层文件加上其中的子区间
#[derive(Debug)]
pub struct AssetDescriptor {
  pub file: File,
  pub offset: u64,
  pub length: u64,
}

/// 资源包（第一级查找）
pub trait AssetStore: Send + Sync {
  /// 以文件描述方式打开，用于内存映射
  fn open_fd(&self, name: &str) -> io::Result<AssetDescriptor>;
  /// 以流方式打开，用于逐行读取
  fn open(&self, name: &str) -> io::Result<Box<dyn Read + Send>>;
}

/// 空资源包，所有查找都落到系统目录
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAssets;

impl AssetStore for NoAssets {
  fn open_fd(&self, name: &str) -> io::Result<AssetDescriptor> {
    Err(io::Error::new(io::ErrorKind::NotFound, name.to_string()))
  }

  fn open(&self, name: &str) -> io::Result<Box<dyn Read + Send>> {
    Err(io::Error::new(io::ErrorKind::NotFound, name.to_string()))
  }
}

/// 以目录作为资源包
#[derive(Debug, Clone)]
pub struct DirectoryAssets {
  root: PathBuf,
}

impl DirectoryAssets {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }
}

impl AssetStore for DirectoryAssets {
  fn open_fd(&self, name: &str) -> io::Result<AssetDescriptor> {
    let file = File::open(self.root.join(name))?;
    let length = file.metadata()?.len();
    Ok(AssetDescriptor {
      file,
      offset: 0,
      length,
    })
  }

  fn open(&self, name: &str) -> io::Result<Box<dyn Read + Send>> {
    Ok(Box::new(File::open(self.root.join(name))?))
  }
}

/// 只读映射的模型权重
#[derive(Debug)]
pub struct MappedModel {
  mmap: Mmap,
  offset: u64,
}

impl MappedModel {
  pub fn as_bytes(&self) -> &[u8] {
    &self.mmap
  }

  pub fn len(&self) -> usize {
    self.mmap.len()
  }

  pub fn is_empty(&self) -> bool {
    self.mmap.is_empty()
  }

  /// 映射区间在底层文件中的起始偏移
  pub fn offset(&self) -> u64 {
    self.offset
  }
}

/// 有序标签表
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTable {
  labels: Vec<String>,
}

impl LabelTable {
  pub fn get(&self, index: usize) -> Option<&str> {
    self.labels.get(index).map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.labels.iter().map(String::as_str)
  }

  /// 逐行读取，只去掉行结束符
  pub fn read_from(reader: impl Read) -> io::Result<Self> {
    let labels = BufReader::new(reader).lines().collect::<io::Result<Vec<_>>>()?;
    Ok(Self { labels })
  }
}

impl From<Vec<String>> for LabelTable {
  fn from(labels: Vec<String>) -> Self {
    Self { labels }
  }
}

/// 两级资源查找：先资源包，再系统目录
pub struct ResourceLocator {
  assets: Box<dyn AssetStore>,
  system_dir: PathBuf,
}

impl Default for ResourceLocator {
  fn default() -> Self {
    Self {
      assets: Box::new(NoAssets),
      system_dir: PathBuf::from(SYSTEM_MODEL_DIR),
    }
  }
}

impl std::fmt::Debug for ResourceLocator {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ResourceLocator")
      .field("system_dir", &self.system_dir)
      .finish_non_exhaustive()
  }
}

impl ResourceLocator {
  pub fn new(assets: impl AssetStore + 'static) -> Self {
    Self {
      assets: Box::new(assets),
      ..Default::default()
    }
  }

  pub fn assets(mut self, assets: impl AssetStore + 'static) -> Self {
    self.assets = Box::new(assets);
    self
  }

  pub fn system_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.system_dir = dir.into();
    self
  }

  pub fn system_path(&self) -> &Path {
    &self.system_dir
  }

  fn not_found(&self, name: &str) -> ResourceError {
    ResourceError::NotFound {
      name: name.to_string(),
      system_dir: self.system_dir.clone(),
    }
  }

  /// 打开系统目录中的文件，不存在或不可读都视为未找到
  fn open_system(&self, name: &str) -> Result<File, ResourceError> {
    let path = self.system_dir.join(name);
    File::open(&path).map_err(|e| {
      warn!("系统目录中无法打开 {}: {}", path.display(), e);
      self.not_found(name)
    })
  }

  /// 查找并只读映射模型文件，尊重资源包给出的偏移与长度
  pub fn load_model(&self, name: &str) -> Result<MappedModel, ResourceError> {
    let descriptor = match self.assets.open_fd(name) {
      Ok(descriptor) => {
        debug!("从资源包打开模型: {}", name);
        descriptor
      }
      Err(e) => {
        debug!("资源包中无法打开模型 {}: {}, 尝试系统目录", name, e);
        let file = self.open_system(name)?;
        let length = file
          .metadata()
          .map_err(|source| ResourceError::Io {
            name: name.to_string(),
            source,
          })?
          .len();
        AssetDescriptor {
          file,
          offset: 0,
          length,
        }
      }
    };

    let length = usize::try_from(descriptor.length).map_err(|_| ResourceError::Io {
      name: name.to_string(),
      source: io::Error::new(io::ErrorKind::InvalidInput, "模型长度超出地址空间"),
    })?;

    // SAFETY: 只读映射；模型文件在管线生命周期内不应被外部修改
    let mmap = unsafe {
      MmapOptions::new()
        .offset(descriptor.offset)
        .len(length)
        .map(&descriptor.file)
    }
    .map_err(|source| ResourceError::Io {
      name: name.to_string(),
      source,
    })?;

    info!(
      "模型 {} 映射完成, 偏移 {}, 大小: {:.2} MB",
      name,
      descriptor.offset,
      mmap.len() as f64 / (1024.0 * 1024.0)
    );

    Ok(MappedModel {
      mmap,
      offset: descriptor.offset,
    })
  }

  /// 查找并读取标签文件
  pub fn load_labels(&self, name: &str) -> Result<LabelTable, ResourceError> {
    let reader: Box<dyn Read + Send> = match self.assets.open(name) {
      Ok(reader) => reader,
      Err(e) => {
        debug!("资源包中无法打开标签 {}: {}, 尝试系统目录", name, e);
        Box::new(self.open_system(name)?)
      }
    };

    let labels = LabelTable::read_from(reader).map_err(|source| ResourceError::Io {
      name: name.to_string(),
      source,
    })?;
    info!("标签 {} 加载完成, 共 {} 项", name, labels.len());
    Ok(labels)
  }
}
