//! Mailbox command handling of the rule catalog RPC.
//!
//! The frame layout and wire spellings live in [`sentinel_bus::mailbox`];
//! this module maps each command onto the engine service and each service
//! error onto its reply code.

use sentinel_bus::{MailboxReply, MailboxRequest};
use sentinel_core::AlertPayload;
use sentinel_rules::RuleError;
use tracing::info;

use crate::service::EngineService;

/// Wire error code for a rule error.
pub fn error_code(error: &RuleError) -> &'static str {
    match error {
        RuleError::BadJson(_) => "BAD_JSON",
        RuleError::BadScript(_) => "BAD_LUA",
        RuleError::AlreadyExists(_) => "ALREADY_EXISTS",
        RuleError::NotFound(_) => "NOT_FOUND",
        RuleError::NotInstantiable => "Rule can't be directly instantiated.",
        RuleError::Io(_) => "Internal error - operating with storage/disk failed.",
    }
}

fn error_reply(error: &RuleError) -> MailboxReply {
    MailboxReply::Error(error_code(error).to_string())
}

/// Handle one mailbox command.
///
/// Returns the reply and any alerts the mutation cascaded (a freshly added
/// rule's first evaluation, the RESOLVED storm of a deletion).
pub fn handle_request(
    service: &EngineService,
    request: &MailboxRequest,
    now_s: u64,
) -> (MailboxReply, Vec<AlertPayload>) {
    match request {
        MailboxRequest::List { type_filter, class } => {
            match service.list_rules(type_filter, class) {
                Some(rules) => (
                    MailboxReply::Listing {
                        type_filter: type_filter.clone(),
                        class: class.clone(),
                        rules,
                    },
                    Vec::new(),
                ),
                None => (MailboxReply::Error("INVALID_TYPE".into()), Vec::new()),
            }
        }
        MailboxRequest::Get { name } => match service.get_rule(name) {
            Some(json) => (MailboxReply::Ok(vec![json]), Vec::new()),
            None => (MailboxReply::Error("NOT_FOUND".into()), Vec::new()),
        },
        MailboxRequest::Add { json } => match service.add_rule(json, now_s) {
            Ok((name, alerts)) => {
                info!(rule = %name, "rule added via mailbox");
                (MailboxReply::Ok(vec![json.clone()]), alerts)
            }
            Err(e) => (error_reply(&e), Vec::new()),
        },
        MailboxRequest::Update { json, old_name } => {
            match service.update_rule(json, old_name, now_s) {
                Ok((name, alerts)) => {
                    info!(rule = %name, old = %old_name, "rule updated via mailbox");
                    (MailboxReply::Ok(vec![json.clone()]), alerts)
                }
                Err(e) => (error_reply(&e), Vec::new()),
            }
        }
        MailboxRequest::Touch { name } => match service.touch(name, now_s) {
            Ok(alerts) => (MailboxReply::Ok(Vec::new()), alerts),
            Err(e) => (error_reply(&e), Vec::new()),
        },
        MailboxRequest::Delete { name } => {
            info!(rule = %name, "requested deletion of rule");
            let (deleted, alerts) = service.delete_rule(name, now_s);
            if deleted.is_empty() {
                (MailboxReply::Error("NO_MATCH".into()), Vec::new())
            } else {
                (MailboxReply::Ok(deleted), alerts)
            }
        }
        MailboxRequest::DeleteElement { asset } => {
            info!(asset = %asset, "requested deletion of rules about element");
            let (deleted, alerts) = service.delete_element(asset, now_s);
            if deleted.is_empty() {
                (MailboxReply::Error("NO_MATCH".into()), Vec::new())
            } else {
                (MailboxReply::Ok(deleted), alerts)
            }
        }
    }
}
