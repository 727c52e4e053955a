//! Rule list representation.
//!
//! Rules are written `TYPE,payload,target[,no-resolve]`, with `MATCH,target`
//! as the catch-all. Evaluating rules against traffic happens elsewhere;
//! this module only parses and holds them.

use std::str::FromStr;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum RuleKind {
    Domain,
    DomainSuffix,
    DomainKeyword,
    IpCidr,
    SrcIpCidr,
    Geoip,
    DstPort,
    SrcPort,
    Match,
}

impl FromStr for RuleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "DOMAIN" => RuleKind::Domain,
            "DOMAIN-SUFFIX" => RuleKind::DomainSuffix,
            "DOMAIN-KEYWORD" => RuleKind::DomainKeyword,
            "IP-CIDR" | "IP-CIDR6" => RuleKind::IpCidr,
            "SRC-IP-CIDR" => RuleKind::SrcIpCidr,
            "GEOIP" => RuleKind::Geoip,
            "DST-PORT" => RuleKind::DstPort,
            "SRC-PORT" => RuleKind::SrcPort,
            "MATCH" | "FINAL" => RuleKind::Match,
            other => return Err(format!("unsupported rule type {:?}", other)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rule {
    pub kind: RuleKind,
    pub payload: String,
    pub target: String,
    pub no_resolve: bool,
}

impl FromStr for Rule {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        let kind: RuleKind = parts[0].parse()?;

        let (payload, target, extra) = match (kind, parts.as_slice()) {
            (RuleKind::Match, [_, target]) => ("", *target, None),
            (RuleKind::Match, _) => return Err(format!("rule {:?}: MATCH takes only a target", line)),
            (_, [_, payload, target]) => (*payload, *target, None),
            (_, [_, payload, target, extra]) => (*payload, *target, Some(*extra)),
            _ => return Err(format!("rule {:?}: expected TYPE,payload,target", line)),
        };

        if target.is_empty() {
            return Err(format!("rule {:?}: empty target", line));
        }

        let no_resolve = match extra {
            None => false,
            Some("no-resolve") if matches!(kind, RuleKind::IpCidr | RuleKind::Geoip) => true,
            Some(other) => return Err(format!("rule {:?}: unexpected option {:?}", line, other)),
        };

        if matches!(kind, RuleKind::DstPort | RuleKind::SrcPort) && payload.parse::<u16>().is_err() {
            return Err(format!("rule {:?}: invalid port {:?}", line, payload));
        }

        Ok(Rule {
            kind,
            payload: payload.to_string(),
            target: target.to_string(),
            no_resolve,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_domain_rule() {
        let rule: Rule = "DOMAIN-SUFFIX,google.com,auto".parse().unwrap();
        assert_eq!(rule.kind, RuleKind::DomainSuffix);
        assert_eq!(rule.payload, "google.com");
        assert_eq!(rule.target, "auto");
        assert!(!rule.no_resolve);
    }

    #[test]
    fn parse_ip_rule_with_option() {
        let rule: Rule = "IP-CIDR, 10.0.0.0/8, DIRECT, no-resolve".parse().unwrap();
        assert_eq!(rule.kind, RuleKind::IpCidr);
        assert!(rule.no_resolve);
    }

    #[test]
    fn parse_match() {
        let rule: Rule = "MATCH,DIRECT".parse().unwrap();
        assert_eq!(rule.kind, RuleKind::Match);
        assert_eq!(rule.payload, "");
    }

    #[test]
    fn reject_malformed() {
        assert!("DOMAIN,example.com".parse::<Rule>().is_err());
        assert!("PROCESS,foo,DIRECT".parse::<Rule>().is_err());
        assert!("DST-PORT,http,DIRECT".parse::<Rule>().is_err());
        assert!("DOMAIN,example.com,DIRECT,no-resolve".parse::<Rule>().is_err());
    }
}
