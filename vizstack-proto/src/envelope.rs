//! The `<ssm>`-wrapped command/response envelope (spec §6), grounded in the
//! message shapes built by `ResourceAccess.allocate`/`attach`/... in the
//! original implementation.

use vizstack_types::xml::{self, Element};
use vizstack_types::{AllocationRequest, VizError, VizErrorKind, VizResult};

/// One decoded client command. `allocId`/`state`/etc. are pulled out of
/// their XML children up front so `vizstack-core`'s dispatcher matches on
/// a plain enum instead of re-walking XML at every call site.
#[derive(Clone, Debug)]
pub enum Command {
    Hello { cleanup_on_disconnect: bool },
    Allocate(AllocationRequest),
    Attach { alloc_id: u64 },
    Deallocate { alloc_id: u64 },
    QueryResource { query: Option<Element> },
    QueryAllocation { alloc_id: u64 },
    GetTemplates { search: Option<Element> },
    GetServerConfig { search: Element },
    UpdateServerConfig { alloc_id: u64, servers: Vec<Element> },
    WaitXState { alloc_id: u64, new_state: bool, timeout_secs: Option<u32>, servers: Vec<Element> },
    StopXServer { alloc_id: u64, servers: Vec<Element> },
    RefreshResourceGroups,
}

impl Command {
    pub fn decode(raw: &[u8]) -> VizResult<Self> {
        let root = xml::parse(raw)?;
        if root.name == "client" {
            let cleanup = root
                .require_child("cleanupOnDisconnect")?
                .parse_bool()?;
            return Ok(Command::Hello { cleanup_on_disconnect: cleanup });
        }
        if root.name != "ssm" {
            return Err(VizError::bad_protocol(format!("expected <ssm> or <client>, got <{}>", root.name)));
        }
        let body = root
            .children
            .first()
            .ok_or_else(|| VizError::bad_protocol("<ssm> carries no command"))?;

        match body.name.as_str() {
            "allocate" => Ok(Command::Allocate(AllocationRequest::from_xml(body)?)),
            "attach" => Ok(Command::Attach { alloc_id: require_alloc_id(body)? }),
            "deallocate" => Ok(Command::Deallocate { alloc_id: require_alloc_id(body)? }),
            "query_resource" => Ok(Command::QueryResource { query: body.children.first().cloned() }),
            "query_allocation" => Ok(Command::QueryAllocation { alloc_id: require_alloc_id(body)? }),
            "get_templates" => Ok(Command::GetTemplates { search: body.children.first().cloned() }),
            "get_serverconfig" => {
                let search = body
                    .children
                    .first()
                    .cloned()
                    .ok_or_else(|| VizError::bad_protocol("get_serverconfig requires a serverconfig search template"))?;
                Ok(Command::GetServerConfig { search })
            }
            "update_serverconfig" => {
                let alloc_id = require_alloc_id(body)?;
                let servers = body.children_named("serverconfig").cloned().collect();
                Ok(Command::UpdateServerConfig { alloc_id, servers })
            }
            "wait_x_state" => {
                let alloc_id = require_alloc_id(body)?;
                let new_state = body.require_child("newState")?.parse_bool()?;
                let timeout_secs = body
                    .child("timeout")
                    .map(|t| t.parse_int())
                    .transpose()?
                    .map(|v| v as u32);
                let servers = body.children_named("serverconfig").cloned().collect();
                Ok(Command::WaitXState { alloc_id, new_state, timeout_secs, servers })
            }
            "stop_x_server" => {
                let alloc_id = require_alloc_id(body)?;
                let servers = body.children_named("serverconfig").cloned().collect();
                Ok(Command::StopXServer { alloc_id, servers })
            }
            "refresh_resource_groups" => Ok(Command::RefreshResourceGroups),
            other => Err(VizError::new(VizErrorKind::BadOperation, format!("unknown command '{other}'"))),
        }
    }
}

fn require_alloc_id(body: &Element) -> VizResult<u64> {
    Ok(body.require_child("allocId")?.parse_int()? as u64)
}

/// A command's result, encoded into the `<ssm><response>...</response></ssm>`
/// envelope (spec §6). `return_value`'s children are command-specific and
/// left as raw `Element`s supplied by the dispatcher.
pub struct Response {
    pub status: Result<Vec<Element>, VizError>,
}

impl Response {
    pub fn ok(return_value: Vec<Element>) -> Self {
        Self { status: Ok(return_value) }
    }

    pub fn err(error: VizError) -> Self {
        Self { status: Err(error) }
    }

    pub fn to_xml(&self) -> Element {
        let mut ssm = Element::new("ssm");
        let mut response = Element::new("response");
        match &self.status {
            Ok(children) => {
                response.push_text("status", "0");
                let mut rv = Element::new("return_value");
                for child in children {
                    rv.push(child.clone());
                }
                response.push(rv);
            }
            Err(e) => {
                response.push_text("status", e.kind.code().to_string());
                response.push_text("message", e.message.clone());
            }
        }
        ssm.push(response);
        ssm
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_xml().to_xml_string().into_bytes()
    }

    /// Decode a raw `<ssm><response>...</response></ssm>` payload, the
    /// counterpart used on the client side (`__sendAndRecvMessage`).
    pub fn decode(raw: &[u8]) -> VizResult<Self> {
        let root = xml::parse(raw)?;
        let response = root.require_child("response")?;
        let status_code: i32 = response
            .require_child("status")?
            .text_trim()
            .parse()
            .map_err(|_| VizError::bad_protocol("response status is not an integer"))?;
        if status_code == 0 {
            let children = response
                .child("return_value")
                .map(|rv| rv.children.clone())
                .unwrap_or_default();
            Ok(Response::ok(children))
        } else {
            let kind = VizErrorKind::from_code(status_code)
                .ok_or_else(|| VizError::bad_protocol(format!("unknown status code {status_code}")))?;
            let message = response.child("message").map(|m| m.text_trim().to_string()).unwrap_or_default();
            Ok(Response::err(VizError::new(kind, message)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_hello() {
        let cmd = Command::decode(b"<client><cleanupOnDisconnect>1</cleanupOnDisconnect></client>").unwrap();
        assert!(matches!(cmd, Command::Hello { cleanup_on_disconnect: true }));
    }

    #[test]
    fn decodes_deallocate() {
        let cmd = Command::decode(b"<ssm><deallocate><allocId>7</allocId></deallocate></ssm>").unwrap();
        assert!(matches!(cmd, Command::Deallocate { alloc_id: 7 }));
    }

    #[test]
    fn unknown_command_is_bad_operation() {
        let err = Command::decode(b"<ssm><frobnicate/></ssm>").unwrap_err();
        assert_eq!(err.kind, VizErrorKind::BadOperation);
    }

    #[test]
    fn response_round_trips_success_and_error() {
        let ok = Response::ok(vec![Element::with_text("id", "42")]);
        let decoded = Response::decode(&ok.to_bytes()).unwrap();
        assert!(decoded.status.is_ok());

        let err = Response::err(VizError::access_denied("nope"));
        let decoded = Response::decode(&err.to_bytes()).unwrap();
        assert_eq!(decoded.status.unwrap_err().kind, VizErrorKind::AccessDenied);
    }
}
