use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use hkcut_core::document::{Document, GeometryError, Sheet};
use thiserror::Error;
use tracing::{debug, info};

mod parser;
mod writer;

pub use parser::{ParseError, parse_program};
pub use writer::{encode_block, export, export_program, fmt_coord};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write file {path:?}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path:?}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: LoadError,
    },
}

/// 文本到文档模型的失败：词法/结构错误或几何校验错误。
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

pub trait ProgramLoader {
    fn load(&self, path: &Path) -> Result<Document, IoError>;
}

pub trait ProgramSaver {
    fn save(&self, document: &Document, path: &Path) -> Result<(), IoError>;
}

/// 解析并组装文档，板料取自 `HKINI` 头。
pub fn parse(source: &str) -> Result<Document, LoadError> {
    parse_with_sheet(source, None)
}

/// 解析并组装文档；`sheet` 给定时覆盖 `HKINI` 头。
pub fn parse_with_sheet(source: &str, sheet: Option<Sheet>) -> Result<Document, LoadError> {
    let program = parse_program(source)?;
    let document = Document::build(program, sheet)?;
    debug!(
        parts = document.parts().len(),
        warnings = document.warnings().len(),
        "文档组装完成"
    );
    Ok(document)
}

/// MPF 文件读写入口。
#[derive(Debug, Clone, Default)]
pub struct MpfFacade {
    sheet_override: Option<Sheet>,
}

impl MpfFacade {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sheet(sheet: Option<Sheet>) -> Self {
        Self {
            sheet_override: sheet,
        }
    }
}

impl ProgramLoader for MpfFacade {
    fn load(&self, path: &Path) -> Result<Document, IoError> {
        let data = fs::read_to_string(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let document = parse_with_sheet(&data, self.sheet_override).map_err(|source| {
            IoError::Load {
                path: path.to_path_buf(),
                source,
            }
        })?;
        info!(path = %path.display(), parts = document.parts().len(), "已加载 MPF 程序");
        Ok(document)
    }
}

impl ProgramSaver for MpfFacade {
    fn save(&self, document: &Document, path: &Path) -> Result<(), IoError> {
        write_atomic(path, &export(document))?;
        info!(path = %path.display(), "已写出 MPF 程序");
        Ok(())
    }
}

/// 先写入同目录临时文件再改名，失败时目标文件保持原状。
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), IoError> {
    let write_error = |source| IoError::WriteError {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(write_error)?;
    file.write_all(contents.as_bytes()).map_err(write_error)?;
    file.flush().map_err(write_error)?;
    file.persist(path)
        .map_err(|err| write_error(err.error))?;
    Ok(())
}
