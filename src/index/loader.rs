//! 文档抽取
//!
//! `.docx` 读取 `word/document.xml` 中每个段落的文本，其他扩展名按 UTF-8 文本读取。

use async_trait::async_trait;
use quick_xml::Reader;
use quick_xml::events::Event;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{AppError, Result};

const DOCX_BODY: &str = "word/document.xml";

/// 从文档路径抽取纯文本
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self, path: &Path) -> Result<String>;
}

fn read_error(path: &Path, cause: impl std::fmt::Display) -> AppError {
    AppError::Io(format!("cannot read document {}: {}", path.display(), cause))
}

fn ensure_text(path: &Path, text: String) -> Result<String> {
    if text.trim().is_empty() {
        return Err(AppError::Validation(format!(
            "document {} contains no text",
            path.display()
        )));
    }
    Ok(text)
}

/// 读取 UTF-8 文本文件（txt、md 等）
#[derive(Debug, Clone, Default)]
pub struct PlainTextLoader;

#[async_trait]
impl DocumentLoader for PlainTextLoader {
    async fn load(&self, path: &Path) -> Result<String> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| read_error(path, e))?;
        ensure_text(path, text)
    }
}

/// 读取 Word 文档，段落之间以换行分隔
#[derive(Debug, Clone, Default)]
pub struct DocxLoader;

#[async_trait]
impl DocumentLoader for DocxLoader {
    async fn load(&self, path: &Path) -> Result<String> {
        let owned: PathBuf = path.to_path_buf();
        let xml = tokio::task::spawn_blocking(move || read_docx_body(&owned))
            .await
            .map_err(|e| AppError::Internal(e.to_string()))??;

        let paragraphs = docx_paragraphs(&xml).map_err(|e| read_error(path, e))?;
        debug!("Extracted {} paragraphs from {}", paragraphs.len(), path.display());
        ensure_text(path, paragraphs.join("\n"))
    }
}

fn read_docx_body(path: &Path) -> Result<String> {
    let file = std::fs::File::open(path).map_err(|e| read_error(path, e))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| read_error(path, e))?;
    let mut body = archive
        .by_name(DOCX_BODY)
        .map_err(|e| read_error(path, e))?;
    let mut xml = String::new();
    body.read_to_string(&mut xml)
        .map_err(|e| read_error(path, e))?;
    Ok(xml)
}

/// 按 `<w:p>` 收集 `<w:t>` 中的文本
fn docx_paragraphs(xml: &str) -> std::result::Result<Vec<String>, String> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(e) if e.name().as_ref() == b"w:t" => in_text = true,
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:tab" => current.push('\t'),
                b"w:br" => current.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text => {
                let text = reader.decoder().decode(&t).map_err(|e| e.to_string())?;
                current.push_str(&text);
            }
            Event::GeneralRef(r) if in_text => {
                if let Some(c) = r.resolve_char_ref().map_err(|e| e.to_string())? {
                    current.push(c);
                } else {
                    let name = reader.decoder().decode(&r).map_err(|e| e.to_string())?;
                    let resolved = quick_xml::escape::resolve_predefined_entity(&name)
                        .ok_or_else(|| format!("unknown entity &{};", name))?;
                    current.push_str(resolved);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(paragraphs)
}

/// 按扩展名选择抽取方式
#[derive(Debug, Clone, Default)]
pub struct ExtensionLoader {
    docx: DocxLoader,
    plain: PlainTextLoader,
}

#[async_trait]
impl DocumentLoader for ExtensionLoader {
    async fn load(&self, path: &Path) -> Result<String> {
        let is_docx = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("docx"));
        if is_docx {
            self.docx.load(path).await
        } else {
            self.plain.load(path).await
        }
    }
}
