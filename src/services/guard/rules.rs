//! Rule-Based Fault Classifier
//!
//! A `StructuredClassifier` built from regex patterns, for deployments without
//! an LLM and as the default backend. Chinese and English operator phrasing
//! are both recognized.
//!
//! Intent is scored per category (fault, config change, query); the highest
//! score wins and ties go to fault, then config change. A request without
//! any network vocabulary or device identifier is off topic regardless of
//! its score.
//!
//! Device identifiers are taken from ASCII tokens: IPv4 addresses and
//! hostnames shaped like `R3`, `SW-1`, `FW2`, `Core1`. The first device
//! named is the source and the second the target; a lone IP address is the
//! target.

use async_trait::async_trait;
use regex::Regex;

use netdiag_core::{
    CoreResult, DiagnosisContext, GuardDecision, Layer, QueryType, StructuredClassifier,
    SymptomType,
};

/// Minimum score for an intent to count at all.
const MIN_INTENT_SCORE: f64 = 0.3;

const PROTOCOLS: &[(&str, Layer)] = &[
    ("stp", Layer::L1),
    ("rstp", Layer::L1),
    ("lacp", Layer::L1),
    ("arp", Layer::L1),
    ("vlan", Layer::L1),
    ("ospf", Layer::L2),
    ("bgp", Layer::L2),
    ("isis", Layer::L2),
    ("is-is", Layer::L2),
    ("icmp", Layer::L2),
    ("mpls", Layer::L2),
    ("vrrp", Layer::L2),
    ("hsrp", Layer::L2),
    ("tcp", Layer::L3),
    ("udp", Layer::L3),
    ("dns", Layer::L4),
    ("dhcp", Layer::L4),
    ("http", Layer::L4),
    ("https", Layer::L4),
    ("ssh", Layer::L4),
    ("snmp", Layer::L4),
    ("ntp", Layer::L4),
    ("tls", Layer::L4),
];

/// Pattern entry: compiled regex + associated score.
struct PatternEntry {
    regex: Regex,
    score: f64,
}

/// Regex-driven intent classifier and context extractor.
pub struct RuleBasedClassifier {
    fault_patterns: Vec<PatternEntry>,
    config_patterns: Vec<PatternEntry>,
    query_patterns: Vec<PatternEntry>,
    network_terms: Vec<Regex>,
    symptom_patterns: Vec<(SymptomType, Regex)>,
    token: Option<Regex>,
    ipv4: Option<Regex>,
    hostname: Option<Regex>,
    non_device: Option<Regex>,
}

impl Default for RuleBasedClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleBasedClassifier {
    /// Create a new classifier with compiled regex patterns.
    pub fn new() -> Self {
        Self {
            fault_patterns: Self::compile_patterns(&[
                (r"(无法|不能|没法|连不上)(访问|连接|连通|ping|登录|上网|通信|解析)?", 0.95),
                (r"(不通|断网|中断|掉线|闪断|丢包|延迟高|延迟大|很慢|变慢|卡顿|超时|震荡|抖动|宕机|挂了|起不来|down了)", 0.90),
                (r"(故障|异常|有问题|出问题|报错|告警|失败|错误)", 0.85),
                (r"(?i)\b(cannot|can't|can not|unable to|could not|couldn't)\s+(reach|access|connect|ping|log ?in|resolve|establish)", 0.95),
                (r"(?i)\b(unreachable|timed? ?out|timeouts?|packet loss|dropping|drops|flapping|flaps|down|outage|slow|latency|jitter|broken|failing|fails|failed|not working|no connectivity|intermittent|loss)\b", 0.85),
                (r"(?i)\b(problems?|issues?|errors?|faults?)\b", 0.60),
            ]),
            config_patterns: Self::compile_patterns(&[
                (r"(修改|更改|设置|添加|删除|新增|启用|禁用|开启|下发|配置一下|帮我配置)", 0.85),
                (r"(?i)^\s*(configure|set|change|add|remove|delete|enable|disable|shutdown|no shutdown)\b", 0.85),
                (r"(?i)\b(change|update|set)\s+.{0,40}\s+(to|on)\b", 0.80),
            ]),
            query_patterns: Self::compile_patterns(&[
                (r"(查询|查看|显示|列出|看一下|看看|检查一下)", 0.80),
                (r"(状态|多少|是什么|有哪些|是否正常)", 0.55),
                (r"(?i)^\s*(show|display|list|get)\b", 0.85),
                (r"(?i)\b(what is|what's|how many|which)\b", 0.70),
                (r"(?i)\bstatus\b", 0.50),
            ]),
            network_terms: Self::compile_regex_list(&[
                r"(网络|网关|接口|端口|路由|设备|交换机|路由器|防火墙|服务器|主机|链路|带宽|光模块|邻居|上网|专线)",
                r"(?i)\b(network|interface|port|router|switch|firewall|server|host|link|route|routing|gateway|vlan|ip|ping|bgp|ospf|tcp|udp|dns|http|https|wan|lan|vpn|mtu|arp|mac|neighbor|optic|sfp|bandwidth)s?\b",
            ]),
            symptom_patterns: vec![
                (SymptomType::Hardware, r"(?i)(光模块|电源|风扇|板卡|crc|optic|sfp|transceiver|fan|power supply|link down|链路down|物理)"),
                (SymptomType::Routing, r"(?i)(路由|邻居|route|routing|bgp|ospf|is-?is|neighbor|adjacency)"),
                (SymptomType::Protocol, r"(?i)(协议|握手|handshake|tcp|udp|dns|dhcp|http|ssl|tls|arp|stp)"),
                (SymptomType::Performance, r"(?i)(慢|延迟|丢包|卡顿|抖动|带宽|slow|latency|packet loss|jitter|throughput|bandwidth|congest)"),
                (SymptomType::Connectivity, r"(?i)(不通|无法访问|无法连接|连不上|断网|掉线|超时|unreachable|cannot reach|can't reach|unable to reach|cannot connect|can't connect|timed? ?out|no connectivity|ping)"),
            ]
            .into_iter()
            .filter_map(|(t, p)| Regex::new(p).ok().map(|r| (t, r)))
            .collect(),
            token: Regex::new(r"[A-Za-z0-9][A-Za-z0-9._/-]*").ok(),
            ipv4: Regex::new(r"^(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})$").ok(),
            hostname: Regex::new(r"(?i)^[a-z]{1,10}[-_]?\d{1,4}([-_.]?[a-z0-9]+)*$").ok(),
            non_device: Regex::new(
                r"(?i)^(l[1-4]|ipv[46]|http[0-9.]*|tls[0-9.]*|sha[0-9]+|vlan[0-9]+|(gi|ge|te|fa|xe|et|eth|po|lo|ae|mgmt|port)[0-9/.:-]*.*)$",
            )
            .ok(),
        }
    }

    /// Classify `text` and extract its fault context.
    pub fn classify_text(&self, text: &str) -> GuardDecision {
        let text = text.trim();
        let tokens = self.tokens(text);
        let devices = self.devices(&tokens);

        let has_network_context =
            !devices.is_empty() || self.network_terms.iter().any(|r| r.is_match(text));
        if !has_network_context {
            return GuardDecision::off_topic();
        }

        let fault = Self::match_patterns(text, &self.fault_patterns);
        let config = Self::match_patterns(text, &self.config_patterns);
        let query = Self::match_patterns(text, &self.query_patterns);

        // Earlier entries win ties.
        let mut best = (QueryType::FaultDiagnosis, fault);
        for candidate in [(QueryType::ConfigChange, config), (QueryType::SimpleQuery, query)] {
            if candidate.1 > best.1 {
                best = candidate;
            }
        }
        let (query_type, score) = best;
        if score < MIN_INTENT_SCORE {
            return GuardDecision::off_topic();
        }
        if query_type != QueryType::FaultDiagnosis {
            return GuardDecision::redirect(query_type);
        }

        let mut context = DiagnosisContext::new(text).with_symptom_type(self.symptom_type(text));
        match devices.as_slice() {
            [] => {}
            [only] if self.is_ipv4(only) => context.target_device = Some(only.clone()),
            [only] => context.source_device = Some(only.clone()),
            [source, target, ..] => {
                context.source_device = Some(source.clone());
                context.target_device = Some(target.clone());
            }
        }

        let protocol = tokens.iter().find_map(|t| {
            let lower = t.to_ascii_lowercase();
            PROTOCOLS.iter().find(|(name, _)| *name == lower)
        });
        if let Some((name, layer)) = protocol {
            context.protocol_hint = Some(name.to_ascii_uppercase());
            context.layer_hint = Some(*layer);
        }
        if let Some(layer) = tokens.iter().find_map(|t| Layer::from_tag(t)) {
            context.layer_hint = Some(layer);
        } else if context.layer_hint.is_none() {
            context.layer_hint = match context.symptom_type {
                SymptomType::Hardware => Some(Layer::L1),
                SymptomType::Routing => Some(Layer::L2),
                _ => None,
            };
        }

        GuardDecision::fault(context)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn compile_patterns(raw: &[(&str, f64)]) -> Vec<PatternEntry> {
        raw.iter()
            .filter_map(|(pattern, score)| {
                Regex::new(pattern).ok().map(|regex| PatternEntry {
                    regex,
                    score: *score,
                })
            })
            .collect()
    }

    fn compile_regex_list(patterns: &[&str]) -> Vec<Regex> {
        patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
    }

    fn match_patterns(text: &str, patterns: &[PatternEntry]) -> f64 {
        patterns
            .iter()
            .filter(|entry| entry.regex.is_match(text))
            .map(|entry| entry.score)
            .fold(0.0_f64, f64::max)
    }

    /// Maximal ASCII runs; CJK text and whitespace both act as separators.
    fn tokens(&self, text: &str) -> Vec<String> {
        let Some(token) = &self.token else {
            return Vec::new();
        };
        token
            .find_iter(text)
            .map(|m| m.as_str().trim_end_matches(['.', '-', '_', '/']).to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }

    fn is_ipv4(&self, token: &str) -> bool {
        let Some(ipv4) = &self.ipv4 else {
            return false;
        };
        ipv4.captures(token).is_some_and(|caps| {
            (1..=4).all(|i| {
                caps.get(i)
                    .and_then(|m| m.as_str().parse::<u16>().ok())
                    .is_some_and(|octet| octet <= 255)
            })
        })
    }

    fn is_hostname(&self, token: &str) -> bool {
        let shaped = self.hostname.as_ref().is_some_and(|r| r.is_match(token));
        let excluded = self.non_device.as_ref().is_some_and(|r| r.is_match(token));
        let protocol = PROTOCOLS
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case(token));
        shaped && !excluded && !protocol
    }

    /// Device identifiers in order of appearance, deduplicated.
    fn devices(&self, tokens: &[String]) -> Vec<String> {
        let mut devices: Vec<String> = Vec::new();
        for token in tokens {
            if (self.is_ipv4(token) || self.is_hostname(token)) && !devices.contains(token) {
                devices.push(token.clone());
            }
        }
        devices
    }

    fn symptom_type(&self, text: &str) -> SymptomType {
        self.symptom_patterns
            .iter()
            .find(|(_, regex)| regex.is_match(text))
            .map(|(symptom_type, _)| *symptom_type)
            .unwrap_or_default()
    }
}

#[async_trait]
impl StructuredClassifier for RuleBasedClassifier {
    fn name(&self) -> &str {
        "rules"
    }

    async fn classify(&self, text: &str) -> CoreResult<GuardDecision> {
        Ok(self.classify_text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str) -> GuardDecision {
        RuleBasedClassifier::new().classify_text(text)
    }

    #[test]
    fn test_fault_with_source_and_target() {
        let decision = classify("R3 无法访问 10.0.100.100");
        assert_eq!(decision.query_type, QueryType::FaultDiagnosis);
        assert!(decision.is_sufficient);
        let ctx = decision.context.unwrap();
        assert_eq!(ctx.source_device.as_deref(), Some("R3"));
        assert_eq!(ctx.target_device.as_deref(), Some("10.0.100.100"));
        assert_eq!(ctx.symptom_type, SymptomType::Connectivity);
    }

    #[test]
    fn test_device_adjacent_to_cjk() {
        let decision = classify("SW-1到FW2之间丢包");
        let ctx = decision.context.unwrap();
        assert_eq!(ctx.source_device.as_deref(), Some("SW-1"));
        assert_eq!(ctx.target_device.as_deref(), Some("FW2"));
        assert_eq!(ctx.symptom_type, SymptomType::Performance);
    }

    #[test]
    fn test_state_query_redirects() {
        let decision = classify("查询 R1 接口状态");
        assert_eq!(decision.query_type, QueryType::SimpleQuery);
        assert_eq!(decision.redirect_mode.as_deref(), Some("standard"));
        assert!(decision.context.is_none());

        let decision = classify("show interface status on Core1");
        assert_eq!(decision.query_type, QueryType::SimpleQuery);
    }

    #[test]
    fn test_config_change_redirects() {
        let decision = classify("修改 R2 的 OSPF cost 为 100");
        assert_eq!(decision.query_type, QueryType::ConfigChange);
        assert!(decision.context.is_none());
    }

    #[test]
    fn test_vague_fault_is_insufficient() {
        let decision = classify("网络有问题");
        assert_eq!(decision.query_type, QueryType::FaultDiagnosis);
        assert!(!decision.is_sufficient);
        assert!(decision.context.unwrap().devices().is_empty());
    }

    #[test]
    fn test_fault_beats_query_vocabulary() {
        let decision = classify("查看一下 R1 为什么不通");
        assert_eq!(decision.query_type, QueryType::FaultDiagnosis);
    }

    #[test]
    fn test_off_topic() {
        assert_eq!(classify("今天天气怎么样").query_type, QueryType::OffTopic);
        assert_eq!(classify("my car is broken").query_type, QueryType::OffTopic);
    }

    #[test]
    fn test_lone_ip_is_target() {
        let ctx = classify("cannot reach 192.168.1.20").context.unwrap();
        assert_eq!(ctx.source_device, None);
        assert_eq!(ctx.target_device.as_deref(), Some("192.168.1.20"));
    }

    #[test]
    fn test_protocol_sets_layer_hint() {
        let ctx = classify("BGP session between R1 and R2 is flapping").context.unwrap();
        assert_eq!(ctx.protocol_hint.as_deref(), Some("BGP"));
        assert_eq!(ctx.layer_hint, Some(Layer::L2));
        assert_eq!(ctx.devices(), vec!["R1".to_string(), "R2".to_string()]);
    }

    #[test]
    fn test_explicit_layer_tag_wins() {
        let ctx = classify("R5 down, looks like an L1 problem").context.unwrap();
        assert_eq!(ctx.layer_hint, Some(Layer::L1));
        assert_eq!(ctx.devices(), vec!["R5".to_string()]);
    }

    #[test]
    fn test_interface_names_are_not_devices() {
        let ctx = classify("R1 Gi0/1 link down, CRC errors").context.unwrap();
        assert_eq!(ctx.devices(), vec!["R1".to_string()]);
        assert_eq!(ctx.symptom_type, SymptomType::Hardware);
    }

    #[test]
    fn test_invalid_octets_are_not_addresses() {
        let classifier = RuleBasedClassifier::new();
        assert!(classifier.is_ipv4("10.0.0.1"));
        assert!(!classifier.is_ipv4("10.0.0.300"));
    }
}
