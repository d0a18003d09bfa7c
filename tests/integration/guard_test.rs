//! Guard Integration Tests
//!
//! Classification scenarios through the rule-based backend and the
//! decision invariants the Guard guarantees for any classifier.

use std::sync::Arc;

use netdiag::services::guard::{Guard, RuleBasedClassifier};
use netdiag_core::{DiagnosisConfig, GuardDecision, QueryType, MISSING_DEVICE};

async fn check(text: &str) -> GuardDecision {
    let guard = Guard::new(Arc::new(RuleBasedClassifier::new()), &DiagnosisConfig::default());
    guard.check(text).await
}

#[tokio::test]
async fn test_unreachable_destination_is_sufficient() {
    let decision = check("R3 无法访问 10.0.100.100").await;
    assert_eq!(decision.query_type, QueryType::FaultDiagnosis);
    assert!(decision.is_sufficient);
    let ctx = decision.context.unwrap();
    assert_eq!(ctx.source_device.as_deref(), Some("R3"));
    assert_eq!(ctx.target_device.as_deref(), Some("10.0.100.100"));
}

#[tokio::test]
async fn test_interface_status_query_redirects() {
    let decision = check("查询 R1 接口状态").await;
    assert_eq!(decision.query_type, QueryType::SimpleQuery);
    assert_eq!(decision.redirect_mode.as_deref(), Some("standard"));
    assert!(decision.context.is_none());
}

#[tokio::test]
async fn test_vague_report_asks_for_devices() {
    let decision = check("网络有问题").await;
    assert_eq!(decision.query_type, QueryType::FaultDiagnosis);
    assert!(!decision.is_sufficient);
    assert!(decision.missing_info.iter().any(|m| m == MISSING_DEVICE));
    assert!(!decision.clarification_prompt.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_non_fault_decisions_never_carry_context() {
    let inputs = [
        "show ip route on R2",
        "修改 R2 的 OSPF cost 为 100",
        "what's the weather like today",
        "",
        "R3 无法访问 10.0.100.100",
        "BGP session between R1 and R2 is flapping",
    ];
    for input in inputs {
        let decision = check(input).await;
        if decision.query_type != QueryType::FaultDiagnosis {
            assert!(decision.context.is_none(), "context leaked for {:?}", input);
        }
        if decision.query_type == QueryType::FaultDiagnosis && decision.is_sufficient && !decision.degraded {
            let ctx = decision.context.as_ref().unwrap();
            assert!(!ctx.symptom.is_empty());
            assert!(ctx.has_device());
        }
        assert_eq!(decision.redirect_mode.is_some(), decision.query_type.redirects());
    }
}
