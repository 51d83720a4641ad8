use thiserror::Error;

/// 故障注入指令类型，每种类型对应一个固定的字面量前缀
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    /// 实例 ID：前 N 次等待注册查询返回 500
    FailAwaitRegistration,
    /// 主机名：前 N 次心跳失败
    FailHeartbeat,
    /// VIP：前 N 次注册返回 500
    FailRegistration,
    /// VIP：注册固定返回指定状态码
    RegisterUseResponseStatusCode,
    /// 主机名：状态变更固定返回 500（精确匹配，无参数）
    FailStatusChange,
}

impl TriggerKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            TriggerKind::FailAwaitRegistration => "FailAwaitRegistrationFirstNTimes-",
            TriggerKind::FailHeartbeat => "FailHeartbeat-",
            TriggerKind::FailRegistration => "FailRegistrationFirstNTimes-",
            TriggerKind::RegisterUseResponseStatusCode => "RegisterUseResponseStatusCode-",
            TriggerKind::FailStatusChange => "FailStatusChange",
        }
    }

    fn takes_param(&self) -> bool {
        !matches!(self, TriggerKind::FailStatusChange)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TriggerError {
    #[error("Trigger value '{value}' has no numeric parameter after '{prefix}'")]
    MissingParam { value: String, prefix: &'static str },

    #[error("Trigger value '{value}' has invalid numeric parameter '{param}'")]
    InvalidParam { value: String, param: String },
}

/// 解析后的故障注入指令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerDirective {
    pub kind: TriggerKind,
    pub param: u32,
}

impl TriggerDirective {
    /// 按给定的候选类型解析字段值
    ///
    /// 字段值不以任何候选前缀开头时返回 `Ok(None)`。参数取前缀之后、
    /// 下一个 `-` 之前的数字，因此 `FailHeartbeat-2-host-a` 的参数是 2。
    pub fn parse(value: &str, kinds: &[TriggerKind]) -> Result<Option<Self>, TriggerError> {
        for kind in kinds {
            if !kind.takes_param() {
                if value == kind.prefix() {
                    return Ok(Some(Self { kind: *kind, param: 0 }));
                }
                continue;
            }

            let Some(rest) = value.strip_prefix(kind.prefix()) else {
                continue;
            };

            let param = rest.split('-').next().unwrap_or_default();
            if param.is_empty() {
                return Err(TriggerError::MissingParam {
                    value: value.to_string(),
                    prefix: kind.prefix(),
                });
            }

            let param = param.parse::<u32>().map_err(|_| TriggerError::InvalidParam {
                value: value.to_string(),
                param: param.to_string(),
            })?;

            tracing::debug!(trigger = %value, kind = ?kind, param, "Got trigger value");
            return Ok(Some(Self { kind: *kind, param }));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_value_is_not_a_trigger() {
        let parsed = TriggerDirective::parse("localhost", &[TriggerKind::FailHeartbeat]).unwrap();
        assert_eq!(parsed, None);
    }

    #[test]
    fn test_parse_numeric_param() {
        let parsed = TriggerDirective::parse(
            "FailAwaitRegistrationFirstNTimes-3",
            &[TriggerKind::FailAwaitRegistration],
        )
        .unwrap()
        .unwrap();

        assert_eq!(parsed.kind, TriggerKind::FailAwaitRegistration);
        assert_eq!(parsed.param, 3);
    }

    #[test]
    fn test_param_stops_at_next_dash() {
        let parsed = TriggerDirective::parse("FailHeartbeat-2-host-a", &[TriggerKind::FailHeartbeat])
            .unwrap()
            .unwrap();
        assert_eq!(parsed.param, 2);
    }

    #[test]
    fn test_only_requested_kinds_are_recognised() {
        // 实例 ID 默认等于主机名，心跳指令不能被当成等待注册指令
        let parsed =
            TriggerDirective::parse("FailHeartbeat-2", &[TriggerKind::FailAwaitRegistration]).unwrap();
        assert_eq!(parsed, None);
    }

    #[test]
    fn test_first_matching_kind_wins() {
        let kinds = [
            TriggerKind::RegisterUseResponseStatusCode,
            TriggerKind::FailRegistration,
        ];

        let parsed = TriggerDirective::parse("RegisterUseResponseStatusCode-501", &kinds)
            .unwrap()
            .unwrap();
        assert_eq!(parsed.kind, TriggerKind::RegisterUseResponseStatusCode);
        assert_eq!(parsed.param, 501);

        let parsed = TriggerDirective::parse("FailRegistrationFirstNTimes-2", &kinds)
            .unwrap()
            .unwrap();
        assert_eq!(parsed.kind, TriggerKind::FailRegistration);
    }

    #[test]
    fn test_fail_status_change_is_exact_match() {
        let kinds = [TriggerKind::FailStatusChange];

        assert!(TriggerDirective::parse("FailStatusChange", &kinds).unwrap().is_some());
        assert!(TriggerDirective::parse("FailStatusChange-1", &kinds).unwrap().is_none());
        assert!(TriggerDirective::parse("failstatuschange", &kinds).unwrap().is_none());
    }

    #[test]
    fn test_malformed_param() {
        let kinds = [TriggerKind::FailHeartbeat];

        assert!(matches!(
            TriggerDirective::parse("FailHeartbeat-", &kinds),
            Err(TriggerError::MissingParam { .. })
        ));
        assert!(matches!(
            TriggerDirective::parse("FailHeartbeat-two", &kinds),
            Err(TriggerError::InvalidParam { .. })
        ));
    }
}
