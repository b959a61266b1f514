//! `context=security` keys. All are enterprise-edition gated: the
//! community build has no role-based access control to configure.

use super::ConfigKey;
use crate::buf::DynBuf;
use crate::error::{Error, ErrorKind, Result};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

pub struct SecurityConfig {
    pub enable_security: AtomicBool,
    pub privilege_refresh_period: AtomicU32,
    pub report_violation: AtomicBool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        SecurityConfig {
            enable_security: AtomicBool::new(false),
            privilege_refresh_period: AtomicU32::new(60),
            report_violation: AtomicBool::new(true),
        }
    }
}

fn parse_bool(value: &str, name: &str) -> Result<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(Error::new(ErrorKind::BadParam, format!("'{}' must be true or false", name))),
    }
}

struct EnableSecurity;
impl ConfigKey<SecurityConfig> for EnableSecurity {
    fn name(&self) -> &'static str {
        "enable-security"
    }
    fn enterprise_only(&self) -> bool {
        true
    }
    fn validate(&self, _state: &SecurityConfig, value: &str) -> Result<()> {
        parse_bool(value, self.name()).map(|_| ())
    }
    fn apply(&self, state: &SecurityConfig, value: &str) {
        state.enable_security.store(value == "true", Ordering::Relaxed);
    }
    fn describe(&self, state: &SecurityConfig, out: &mut DynBuf) {
        out.append_bool(state.enable_security.load(Ordering::Relaxed));
    }
}

struct PrivilegeRefreshPeriod;
impl ConfigKey<SecurityConfig> for PrivilegeRefreshPeriod {
    fn name(&self) -> &'static str {
        "privilege-refresh-period"
    }
    fn enterprise_only(&self) -> bool {
        true
    }
    fn validate(&self, _state: &SecurityConfig, value: &str) -> Result<()> {
        let v: u32 = value
            .parse()
            .map_err(|_| Error::new(ErrorKind::BadParam, "'privilege-refresh-period' must be an integer"))?;
        if !(10..=86400).contains(&v) {
            return Err(Error::new(
                ErrorKind::BadParam,
                "'privilege-refresh-period' must be between 10 and 86400 seconds",
            ));
        }
        Ok(())
    }
    fn apply(&self, state: &SecurityConfig, value: &str) {
        state.privilege_refresh_period.store(value.parse().expect("validated"), Ordering::Relaxed);
    }
    fn describe(&self, state: &SecurityConfig, out: &mut DynBuf) {
        out.append_u64(state.privilege_refresh_period.load(Ordering::Relaxed) as u64);
    }
}

struct ReportViolation;
impl ConfigKey<SecurityConfig> for ReportViolation {
    fn name(&self) -> &'static str {
        "report-violation"
    }
    fn enterprise_only(&self) -> bool {
        true
    }
    fn validate(&self, _state: &SecurityConfig, value: &str) -> Result<()> {
        parse_bool(value, self.name()).map(|_| ())
    }
    fn apply(&self, state: &SecurityConfig, value: &str) {
        state.report_violation.store(value == "true", Ordering::Relaxed);
    }
    fn describe(&self, state: &SecurityConfig, out: &mut DynBuf) {
        out.append_bool(state.report_violation.load(Ordering::Relaxed));
    }
}

pub(super) fn keys() -> Vec<Box<dyn ConfigKey<SecurityConfig>>> {
    vec![Box::new(EnableSecurity), Box::new(PrivilegeRefreshPeriod), Box::new(ReportViolation)]
}
