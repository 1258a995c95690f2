//! 会话存储
//!
//! 持有全部会话，负责启动加载、ID 分配、查询、追加和删除。
//! 结构性变更（创建、删除）由映射锁串行化；同一会话上的追加和读取由
//! 会话自身的异步锁串行化。

use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::models::chat::{ChatSession, ChatSummary, ExchangePair};
use crate::models::report::{LoadReport, SkippedKind};

type SessionHandle = Arc<Mutex<ChatSession>>;

/// 映射中的条目，名称在锁外可读，避免列表请求等待进行中的生成
struct SessionEntry {
    name: String,
    session: SessionHandle,
}

/// 选择最小的未被占用的非负整数
///
/// 没有空洞时结果等于已占用 ID 的数量。
pub fn allocate_id<I>(used: I) -> u64
where
    I: IntoIterator<Item = u64>,
{
    let used: BTreeSet<u64> = used.into_iter().collect();
    let mut candidate = 0u64;
    for id in used {
        if id != candidate {
            break;
        }
        candidate += 1;
    }
    candidate
}

/// 对单个会话的独占租约
///
/// 持有期间同一会话上的其他追加、读取和删除都会等待。
pub struct SessionLease {
    handle: SessionHandle,
    guard: OwnedMutexGuard<ChatSession>,
}

impl SessionLease {
    pub fn id(&self) -> u64 {
        self.guard.id()
    }

    pub fn name(&self) -> &str {
        self.guard.name()
    }
}

/// 会话存储
pub struct ChatSessionStore {
    root: PathBuf,
    sessions: RwLock<HashMap<u64, SessionEntry>>,
    // 启动时被跳过的 `<n>.json` 仍占用 n，分配时绕开，避免覆盖待恢复的文件
    reserved: BTreeSet<u64>,
}

impl std::fmt::Debug for ChatSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSessionStore")
            .field("root", &self.root)
            .field("sessions", &self.sessions.read().len())
            .field("reserved", &self.reserved)
            .finish()
    }
}

impl ChatSessionStore {
    /// 创建空存储（不读取磁盘）
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            sessions: RwLock::new(HashMap::new()),
            reserved: BTreeSet::new(),
        }
    }

    /// 加载目录下的全部会话文件
    ///
    /// 单个文件损坏或 ID 重复时记录并跳过，其余会话照常加载。
    /// 被跳过文件名对应的 ID 保留下来，不会分配给新会话。
    /// 目录不存在时自动创建。
    pub async fn load_all(root: impl Into<PathBuf>) -> Result<(Self, LoadReport)> {
        let root = root.into();
        info!("Loading chat sessions from {}", root.display());
        tokio::fs::create_dir_all(&root).await?;

        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(&root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file() || is_temp_file(&path) {
                continue;
            }
            paths.push(path);
        }
        paths.sort();

        let mut report = LoadReport::default();
        let mut sessions = HashMap::new();
        let mut reserved = BTreeSet::new();
        for path in paths {
            match ChatSession::load(&path).await {
                Ok(session) => {
                    let id = session.id();
                    if sessions.contains_key(&id) {
                        warn!("Skipping {}: duplicate chat id {}", path.display(), id);
                        report.skip(
                            SkippedKind::ChatSession,
                            path.display().to_string(),
                            format!("duplicate chat id {}", id),
                        );
                        reserved.extend(file_id(&path));
                        continue;
                    }
                    debug!("Loaded chat {} ({})", id, session.name());
                    // 文件名与内容 ID 不一致时，文件名中的 ID 同样被占用
                    reserved.extend(file_id(&path).filter(|stem| *stem != id));
                    sessions.insert(
                        id,
                        SessionEntry {
                            name: session.name().to_string(),
                            session: Arc::new(Mutex::new(session)),
                        },
                    );
                }
                Err(e) => {
                    warn!("Skipping corrupt chat file: {}", e);
                    report.skip(SkippedKind::ChatSession, path.display().to_string(), e.to_string());
                    reserved.extend(file_id(&path));
                }
            }
        }

        if !reserved.is_empty() {
            warn!("Chat ids {:?} are held by files that were not loaded as-is", reserved);
        }

        report.sessions_loaded = sessions.len();
        info!(
            "Loaded {} chat sessions ({} skipped)",
            report.sessions_loaded,
            report.skipped.len()
        );

        Ok((
            Self {
                root,
                sessions: RwLock::new(sessions),
                reserved,
            },
            report,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.sessions.read().contains_key(&id)
    }

    /// 获取会话名称
    pub fn name(&self, id: u64) -> Result<String> {
        self.sessions
            .read()
            .get(&id)
            .map(|entry| entry.name.clone())
            .ok_or_else(|| not_found(id))
    }

    /// 创建新会话并返回分配的 ID
    pub fn create(&self, name: &str) -> u64 {
        let mut sessions = self.sessions.write();
        let id = allocate_id(sessions.keys().chain(self.reserved.iter()).copied());
        sessions.insert(
            id,
            SessionEntry {
                name: name.to_string(),
                session: Arc::new(Mutex::new(ChatSession::new(id, name))),
            },
        );
        info!("Created chat {} ({})", id, name);
        id
    }

    /// 获取会话的独占租约
    pub async fn lease(&self, id: u64) -> Result<SessionLease> {
        let handle = self.handle(id)?;
        let guard = handle.clone().lock_owned().await;
        Ok(SessionLease { handle, guard })
    }

    /// 在租约上追加一轮问答并写盘
    ///
    /// 租约获取后会话若已被删除，返回 NotFound 且不写任何文件。
    pub async fn commit(&self, lease: &mut SessionLease, pair: ExchangePair) -> Result<()> {
        let id = lease.id();
        if !self.is_live(id, &lease.handle) {
            return Err(not_found(id));
        }
        tokio::fs::create_dir_all(&self.root).await?;
        let path = lease.guard.append(pair, &self.root).await?;
        debug!("Chat {} saved to {}", id, path.display());
        Ok(())
    }

    /// 追加一轮问答
    pub async fn append(&self, id: u64, user: &str, response: &str) -> Result<()> {
        let mut lease = self.lease(id).await?;
        self.commit(&mut lease, ExchangePair::new(user, response))
            .await
    }

    /// 获取会话历史
    pub async fn history(&self, id: u64) -> Result<Vec<ExchangePair>> {
        let handle = self.handle(id)?;
        let session = handle.lock().await;
        Ok(session.history().to_vec())
    }

    /// 列出全部会话摘要，顺序不作保证
    pub fn list_summaries(&self) -> Vec<ChatSummary> {
        let mut summaries: Vec<ChatSummary> = self
            .sessions
            .read()
            .iter()
            .map(|(id, entry)| ChatSummary {
                id: *id,
                name: entry.name.clone(),
            })
            .collect();
        summaries.sort_by_key(|s| s.id);
        summaries
    }

    /// 删除会话文件和内存条目
    ///
    /// 未知 ID 返回 NotFound；文件删除失败返回 RemoveFailed，两种情况都不修改存储。
    /// 从未写过盘的会话只删除内存条目。
    pub async fn remove(&self, id: u64) -> Result<()> {
        let handle = self.handle(id)?;
        let session = handle.lock().await;
        if !self.is_live(id, &handle) {
            return Err(not_found(id));
        }

        if let Some(path) = session.path() {
            tokio::fs::remove_file(path).await.map_err(|e| {
                warn!("Chat {} was not removed: {}", id, e);
                AppError::RemoveFailed {
                    target: format!("chat {}", id),
                    cause: e.to_string(),
                }
            })?;
        }

        self.sessions.write().remove(&id);
        info!("Chat {} removed", id);
        Ok(())
    }

    fn handle(&self, id: u64) -> Result<SessionHandle> {
        self.sessions
            .read()
            .get(&id)
            .map(|entry| entry.session.clone())
            .ok_or_else(|| not_found(id))
    }

    fn is_live(&self, id: u64, handle: &SessionHandle) -> bool {
        self.sessions
            .read()
            .get(&id)
            .is_some_and(|entry| Arc::ptr_eq(&entry.session, handle))
    }
}

fn not_found(id: u64) -> AppError {
    AppError::NotFound(format!("chat {}", id))
}

/// `<n>.json` 文件名中的 ID
fn file_id(path: &Path) -> Option<u64> {
    if path.extension()? != "json" {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

fn is_temp_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "tmp")
}
