use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// 单个重试计数器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryCounter {
    pub times_to_fail: u32,
    pub times_failed: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LedgerEntry {
    Armed(RetryCounter),
    // 失败预算已用完，同一 key 后续调用直接成功
    Exhausted,
}

/// 本次调用应当失败还是成功
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    Fail,
    Succeed,
}

impl RetryOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, RetryOutcome::Fail)
    }
}

/// 重试账本：一类故障注入的计数器集合
///
/// 每个 key 的读-改-写都在 `DashMap` 的 entry 锁内完成，
/// 同一 key 的并发调用不会丢失更新。
#[derive(Debug)]
pub struct RetryLedger {
    name: &'static str,
    entries: DashMap<String, LedgerEntry>,
    rearm_after_success: bool,
}

impl RetryLedger {
    pub fn new(name: &'static str, rearm_after_success: bool) -> Self {
        Self {
            name,
            entries: DashMap::new(),
            rearm_after_success,
        }
    }

    /// 记录一次带触发值的调用并决定结果
    ///
    /// 首次调用建立计数器（已失败 1 次）并失败；之后已失败次数小于预算时递增并失败；
    /// 达到预算时成功。默认模式下该 key 标记为已用完并一直保留，直到 `forget` 或 `reset`；
    /// `rearm_after_success` 模式下直接移除，下一次调用重新计数。
    pub fn observe(&self, key: &str, times_to_fail: u32) -> RetryOutcome {
        match self.entries.entry(key.to_string()) {
            Entry::Vacant(vacant) => {
                tracing::debug!(
                    ledger = self.name,
                    retry_key = %key,
                    times_to_fail,
                    "Set up retry counter, returning error"
                );
                vacant.insert(LedgerEntry::Armed(RetryCounter {
                    times_to_fail,
                    times_failed: 1,
                }));
                RetryOutcome::Fail
            }
            Entry::Occupied(mut occupied) => {
                let current = *occupied.get();
                match current {
                    LedgerEntry::Exhausted => RetryOutcome::Succeed,
                    LedgerEntry::Armed(counter) if counter.times_failed < counter.times_to_fail => {
                        let times_failed = counter.times_failed + 1;
                        tracing::debug!(
                            ledger = self.name,
                            retry_key = %key,
                            times_failed,
                            times_to_fail = counter.times_to_fail,
                            "Times failed below budget, returning error"
                        );
                        occupied.insert(LedgerEntry::Armed(RetryCounter {
                            times_to_fail: counter.times_to_fail,
                            times_failed,
                        }));
                        RetryOutcome::Fail
                    }
                    LedgerEntry::Armed(counter) => {
                        tracing::debug!(
                            ledger = self.name,
                            retry_key = %key,
                            times_to_fail = counter.times_to_fail,
                            "Reached failure budget, returning success"
                        );
                        if self.rearm_after_success {
                            occupied.remove();
                        } else {
                            occupied.insert(LedgerEntry::Exhausted);
                        }
                        RetryOutcome::Succeed
                    }
                }
            }
        }
    }

    // 当前仍在计数中的计数器
    pub fn counter(&self, key: &str) -> Option<RetryCounter> {
        self.entries.get(key).and_then(|entry| match *entry.value() {
            LedgerEntry::Armed(counter) => Some(counter),
            LedgerEntry::Exhausted => None,
        })
    }

    pub fn active_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry.value(), LedgerEntry::Armed(_)))
            .count()
    }

    // 移除单个 key（计数中或已用完），返回是否存在
    pub fn forget(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            tracing::debug!(ledger = self.name, retry_key = %key, "Forgot retry counter");
        }
        removed
    }

    pub fn reset(&self) {
        self.entries.clear();
    }
}
