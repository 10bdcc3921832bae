// ============================================================================
// 打包服务：递归并发遍历目录、构建内存归档、ZIP 序列化
// 纯 Rust 函数，方便单元测试
// ============================================================================

use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use base64::Engine;
use rayon::prelude::*;
use sha2::{Digest, Sha256};

use crate::services::path_filter::{accepts, FilterConfiguration};
use crate::utils::cancel::CancelFlag;
use crate::utils::error::{AppError, AppResult};

/// 归档条目：文件内容或目录占位
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveEntry {
    File { relative_path: String, content: Vec<u8> },
    Directory { relative_path: String },
}

impl ArchiveEntry {
    pub fn relative_path(&self) -> &str {
        match self {
            ArchiveEntry::File { relative_path, .. } => relative_path,
            ArchiveEntry::Directory { relative_path } => relative_path,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, ArchiveEntry::File { .. })
    }
}

/// 内存归档，按相对路径去重，构建完成后不再修改
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Archive {
    entries: BTreeMap<String, ArchiveEntry>,
}

impl Archive {
    /// 由条目集合组装归档，同路径后者覆盖前者
    pub fn from_entries(entries: impl IntoIterator<Item = ArchiveEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|entry| (entry.relative_path().to_string(), entry))
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> impl Iterator<Item = &ArchiveEntry> {
        self.entries.values()
    }

    pub fn file_count(&self) -> usize {
        self.entries.values().filter(|e| e.is_file()).count()
    }

    /// 没有任何文件条目（目录占位不算）
    pub fn is_empty(&self) -> bool {
        self.file_count() == 0
    }

    /// 所有文件条目的相对路径，按字典序
    pub fn file_paths(&self) -> Vec<String> {
        self.entries
            .values()
            .filter(|e| e.is_file())
            .map(|e| e.relative_path().to_string())
            .collect()
    }

    pub fn directory_paths(&self) -> Vec<String> {
        self.entries
            .values()
            .filter(|e| !e.is_file())
            .map(|e| e.relative_path().to_string())
            .collect()
    }

    /// 读取某个文件条目的内容
    pub fn content(&self, relative_path: &str) -> Option<&[u8]> {
        match self.entries.get(relative_path) {
            Some(ArchiveEntry::File { content, .. }) => Some(content),
            _ => None,
        }
    }

    /// 条目集合的 SHA256 摘要（十六进制），与遍历顺序无关
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for entry in self.entries.values() {
            match entry {
                ArchiveEntry::File {
                    relative_path,
                    content,
                } => {
                    hasher.update(b"F");
                    hasher.update(relative_path.as_bytes());
                    hasher.update([0u8]);
                    hasher.update((content.len() as u64).to_le_bytes());
                    hasher.update(content);
                }
                ArchiveEntry::Directory { relative_path } => {
                    hasher.update(b"D");
                    hasher.update(relative_path.as_bytes());
                    hasher.update([0u8]);
                }
            }
        }
        format!("{:x}", hasher.finalize())
    }

    /// 序列化为 ZIP 字节（DEFLATE 压缩，目录条目以 `/` 结尾）
    pub fn to_zip_bytes(&self) -> AppResult<Vec<u8>> {
        let mut zip_writer = zip::ZipWriter::new(Cursor::new(Vec::new()));

        // 固定时间戳，保证相同条目产出相同字节
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default());

        for entry in self.entries.values() {
            match entry {
                ArchiveEntry::Directory { relative_path } => {
                    zip_writer
                        .add_directory(format!("{}/", relative_path), options)
                        .map_err(|e| AppError::Archive(format!("添加目录 {} 失败: {}", relative_path, e)))?;
                }
                ArchiveEntry::File {
                    relative_path,
                    content,
                } => {
                    zip_writer
                        .start_file(relative_path.as_str(), options)
                        .map_err(|e| AppError::Archive(format!("添加文件 {} 失败: {}", relative_path, e)))?;
                    zip_writer
                        .write_all(content)
                        .map_err(|e| AppError::Archive(format!("写入文件 {} 失败: {}", relative_path, e)))?;
                }
            }
        }

        let cursor = zip_writer
            .finish()
            .map_err(|e| AppError::Archive(format!("完成写入失败: {}", e)))?;
        Ok(cursor.into_inner())
    }

    /// ZIP 字节的 base64 文本，用于远程 upsert
    pub fn to_base64(&self) -> AppResult<String> {
        let bytes = self.to_zip_bytes()?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }
}

/// 递归遍历 `source_root`，按过滤配置构建归档
///
/// 同一目录下的兄弟条目并发处理，每一层目录是一个汇合点；
/// 任意位置的第一个错误会使整个构建失败，不返回部分归档。
pub fn build_archive(
    source_root: &Path,
    config: &FilterConfiguration,
    cancel: &CancelFlag,
) -> AppResult<Archive> {
    let entries = walk_dir(source_root, "", config, cancel)?;
    let archive = Archive::from_entries(entries);

    log::info!(
        "已打包 {}：{} 个文件，{} 个目录",
        source_root.display(),
        archive.file_count(),
        archive.entries.len() - archive.file_count()
    );

    Ok(archive)
}

/// 列出一个目录并并发处理其所有子项
fn walk_dir(
    dir: &Path,
    relative_dir: &str,
    config: &FilterConfiguration,
    cancel: &CancelFlag,
) -> AppResult<Vec<ArchiveEntry>> {
    cancel.check()?;

    let children: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(fs_error(dir))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<_, _>>()
        .map_err(fs_error(dir))?;

    // collect 到 Result 是汇合点，遇到第一个 Err 即短路
    let nested: Vec<Vec<ArchiveEntry>> = children
        .par_iter()
        .map(|child| visit_child(child, relative_dir, config, cancel))
        .collect::<AppResult<_>>()?;

    Ok(nested.into_iter().flatten().collect())
}

fn visit_child(
    path: &Path,
    relative_dir: &str,
    config: &FilterConfiguration,
    cancel: &CancelFlag,
) -> AppResult<Vec<ArchiveEntry>> {
    let name = match path.file_name() {
        Some(name) => name.to_str().map(str::to_string).ok_or_else(|| AppError::FileSystem {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, "文件名不是有效的 UTF-8"),
        })?,
        None => return Ok(Vec::new()),
    };
    // 统一使用正斜杠作为 ZIP 内路径分隔符
    let relative_path = if relative_dir.is_empty() {
        name.clone()
    } else {
        format!("{}/{}", relative_dir, name)
    };

    let metadata = std::fs::metadata(path).map_err(fs_error(path))?;

    if metadata.is_dir() {
        let mut entries = walk_dir(path, &relative_path, config, cancel)?;
        // 只为包含文件的目录登记占位
        if entries.iter().any(ArchiveEntry::is_file) {
            entries.push(ArchiveEntry::Directory { relative_path });
        }
        return Ok(entries);
    }

    if !accepts(&name, config) {
        return Ok(Vec::new());
    }

    cancel.check()?;
    let content = std::fs::read(path).map_err(fs_error(path))?;
    Ok(vec![ArchiveEntry::File {
        relative_path,
        content,
    }])
}

fn fs_error(path: &Path) -> impl FnOnce(std::io::Error) -> AppError + '_ {
    move |source| AppError::FileSystem {
        path: path.to_path_buf(),
        source,
    }
}

// ============================================================================
// 单元测试
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::dtos::{RuleSpec, RuleValue};
    use crate::services::path_filter::configure;
    use proptest::prelude::*;
    use std::fs;
    use std::io::Read;
    use tempfile::TempDir;

    /// 场景树：a.txt 与 b/nested.css
    fn scenario_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        fs::create_dir(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("b").join("nested.css"), "body {}").unwrap();
        dir
    }

    fn build(dir: &Path, config: &FilterConfiguration) -> AppResult<Archive> {
        build_archive(dir, config, &CancelFlag::new())
    }

    #[test]
    fn test_build_without_rules_keeps_everything() {
        let dir = scenario_tree();
        let archive = build(dir.path(), &FilterConfiguration::passthrough()).unwrap();

        assert_eq!(archive.file_paths(), vec!["a.txt", "b/nested.css"]);
        assert_eq!(archive.directory_paths(), vec!["b"]);
        assert_eq!(archive.content("a.txt"), Some(&b"alpha"[..]));
        assert_eq!(archive.content("b/nested.css"), Some(&b"body {}"[..]));
    }

    #[test]
    fn test_build_with_literal_exclude() {
        let dir = scenario_tree();
        let exclude = RuleSpec::One(RuleValue::Literal("a.txt".into()));
        let config = configure(None, Some(&exclude)).unwrap();

        let archive = build(dir.path(), &config).unwrap();
        assert_eq!(archive.file_paths(), vec!["b/nested.css"]);
    }

    #[test]
    fn test_filter_applies_to_file_name_not_path() {
        let dir = scenario_tree();
        let include = RuleSpec::One(RuleValue::Literal("nested.css".into()));
        let config = configure(Some(&include), None).unwrap();

        let archive = build(dir.path(), &config).unwrap();
        assert_eq!(archive.file_paths(), vec!["b/nested.css"]);
    }

    #[test]
    fn test_directories_without_accepted_files_get_no_placeholder() {
        let dir = scenario_tree();
        fs::create_dir_all(dir.path().join("empty").join("deeper")).unwrap();
        fs::create_dir(dir.path().join("maps")).unwrap();
        fs::write(dir.path().join("maps").join("app.js.map"), "{}").unwrap();

        let exclude = RuleSpec::One(RuleValue::Pattern {
            regex: r"\.map$".into(),
        });
        let config = configure(None, Some(&exclude)).unwrap();

        let archive = build(dir.path(), &config).unwrap();
        assert_eq!(archive.directory_paths(), vec!["b"]);
        assert_eq!(archive.file_paths(), vec!["a.txt", "b/nested.css"]);
    }

    #[test]
    fn test_deep_nesting_uses_forward_slashes() {
        let dir = TempDir::new().unwrap();
        let deep = dir.path().join("x").join("y").join("z");
        fs::create_dir_all(&deep).unwrap();
        fs::write(deep.join("leaf.js"), "1").unwrap();

        let archive = build(dir.path(), &FilterConfiguration::passthrough()).unwrap();
        assert_eq!(archive.file_paths(), vec!["x/y/z/leaf.js"]);
        assert_eq!(archive.directory_paths(), vec!["x", "x/y", "x/y/z"]);
    }

    #[test]
    fn test_missing_root_is_file_system_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");

        let err = build(&missing, &FilterConfiguration::passthrough()).unwrap_err();
        match err {
            AppError::FileSystem { path, .. } => assert_eq!(path, missing),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_nested_file_fails_whole_build() {
        let dir = scenario_tree();
        // 悬空符号链接：metadata 失败
        std::os::unix::fs::symlink(
            dir.path().join("gone.txt"),
            dir.path().join("b").join("dangling.txt"),
        )
        .unwrap();

        let result = build(dir.path(), &FilterConfiguration::passthrough());
        assert!(matches!(result, Err(AppError::FileSystem { .. })));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_non_utf8_file_name_fails_build() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = scenario_tree();
        let bad = dir.path().join(OsStr::from_bytes(b"bad\xff.txt"));
        fs::write(&bad, "x").unwrap();

        let err = build(dir.path(), &FilterConfiguration::passthrough()).unwrap_err();
        match err {
            AppError::FileSystem { path, source } => {
                assert_eq!(path, bad);
                assert_eq!(source.kind(), std::io::ErrorKind::InvalidData);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_cancelled_flag_aborts_build() {
        let dir = scenario_tree();
        let cancel = CancelFlag::new();
        cancel.cancel();

        let result = build_archive(dir.path(), &FilterConfiguration::passthrough(), &cancel);
        assert!(matches!(result, Err(AppError::Cancelled)));
    }

    #[test]
    fn test_build_twice_is_identical() {
        let dir = scenario_tree();
        let first = build(dir.path(), &FilterConfiguration::passthrough()).unwrap();
        let second = build(dir.path(), &FilterConfiguration::passthrough()).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.digest(), second.digest());
        assert_eq!(first.to_zip_bytes().unwrap(), second.to_zip_bytes().unwrap());
    }

    #[test]
    fn test_zip_bytes_contain_entries() {
        let dir = scenario_tree();
        let archive = build(dir.path(), &FilterConfiguration::passthrough()).unwrap();
        let bytes = archive.to_zip_bytes().unwrap();

        // 解压验证内容
        let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut names: Vec<String> = (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.txt", "b/", "b/nested.css"]);

        let mut nested = zip.by_name("b/nested.css").unwrap();
        assert_eq!(nested.compression(), zip::CompressionMethod::Deflated);
        let mut text = String::new();
        nested.read_to_string(&mut text).unwrap();
        assert_eq!(text, "body {}");
    }

    #[test]
    fn test_base64_decodes_to_zip() {
        let dir = scenario_tree();
        let archive = build(dir.path(), &FilterConfiguration::passthrough()).unwrap();
        let encoded = archive.to_base64().unwrap();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap();
        assert_eq!(decoded, archive.to_zip_bytes().unwrap());
    }

    #[test]
    fn test_empty_tree_yields_empty_archive() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("only_dirs")).unwrap();

        let archive = build(dir.path(), &FilterConfiguration::passthrough()).unwrap();
        assert!(archive.is_empty());
        assert_eq!(archive.entries().count(), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// 任意目录树：归档的文件路径集合等于被接受文件的相对路径集合
        #[test]
        fn prop_file_paths_match_accepted_files(
            files in proptest::collection::btree_set(
                proptest::collection::vec("[a-d]{1,3}", 1..4),
                1..8
            ),
            excluded in "[a-d]{1,3}"
        ) {
            let dir = TempDir::new().unwrap();
            let mut expected = Vec::new();

            for segments in &files {
                // 目录与文件使用不同后缀，避免同名冲突
                let (file, dirs) = segments.split_last().unwrap();
                let mut path = dir.path().to_path_buf();
                let mut relative: Vec<String> = Vec::new();
                for d in dirs {
                    path.push(format!("{}.d", d));
                    relative.push(format!("{}.d", d));
                }
                fs::create_dir_all(&path).unwrap();
                let file_name = format!("{}.f", file);
                fs::write(path.join(&file_name), file.as_bytes()).unwrap();
                relative.push(file_name.clone());
                if file_name != format!("{}.f", excluded) {
                    expected.push(relative.join("/"));
                }
            }
            expected.sort();
            expected.dedup();

            let exclude = RuleSpec::One(RuleValue::Literal(format!("{}.f", excluded)));
            let config = configure(None, Some(&exclude)).unwrap();
            let archive = build(dir.path(), &config).unwrap();

            prop_assert_eq!(archive.file_paths(), expected);
        }
    }
}
