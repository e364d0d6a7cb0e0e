//! Static per-type schema registry
//!
//! One [`SchemaRecord`] per known unit type. Types outside [`UnitKind`] have
//! no record and only get reference resolution and expression correction.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::client::short_type_name;

/// Known processing-unit types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitKind {
    GenerateFlowFile,
    LogAttribute,
    HandleHttpRequest,
    HandleHttpResponse,
    RouteOnAttribute,
    UpdateAttribute,
    EvaluateJsonPath,
    InvokeHttp,
    PutFile,
    ExecuteScript,
    Other,
}

impl UnitKind {
    /// Classify a type by its short name, fully qualified or not
    pub fn from_type(type_name: &str) -> Self {
        match short_type_name(type_name) {
            "GenerateFlowFile" => UnitKind::GenerateFlowFile,
            "LogAttribute" => UnitKind::LogAttribute,
            "HandleHttpRequest" => UnitKind::HandleHttpRequest,
            "HandleHttpResponse" => UnitKind::HandleHttpResponse,
            "RouteOnAttribute" => UnitKind::RouteOnAttribute,
            "UpdateAttribute" => UnitKind::UpdateAttribute,
            "EvaluateJsonPath" => UnitKind::EvaluateJsonPath,
            "InvokeHTTP" => UnitKind::InvokeHttp,
            "PutFile" => UnitKind::PutFile,
            "ExecuteScript" => UnitKind::ExecuteScript,
            _ => UnitKind::Other,
        }
    }
}

/// Whether user-defined properties are accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dynamic {
    None,
    /// Accepted, values are literal
    Plain,
    /// Accepted, values are expressions
    Expression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Filled in when missing
    Default(&'static str),
    /// Must be supplied by the caller
    Mandatory,
    /// Must reference a service implementing `interface`
    Service {
        interface: &'static str,
        type_hint: &'static str,
    },
}

#[derive(Debug, Clone)]
pub struct SchemaRecord {
    pub properties: &'static [&'static str],
    pub dynamic: Dynamic,
    /// Dynamic property values are boolean conditions
    pub dynamic_conditions: bool,
    /// Commonly mistaken name → correct name
    pub property_aliases: &'static [(&'static str, &'static str)],
    /// Names that are always rejected, with the reason
    pub rejected: &'static [(&'static str, &'static str)],
    pub required: &'static [(&'static str, Requirement)],
    pub allowed_values: &'static [(&'static str, &'static [&'static str])],
    /// (property, mistaken value, canonical value)
    pub value_aliases: &'static [(&'static str, &'static str, &'static str)],
    pub service_properties: &'static [&'static str],
    pub expression_properties: &'static [&'static str],
    /// Properties that must be unset rather than empty
    pub clear_when_empty: &'static [&'static str],
    /// Relationships always terminated when no link consumes them
    pub terminate: &'static [&'static str],
}

impl SchemaRecord {
    const EMPTY: SchemaRecord = SchemaRecord {
        properties: &[],
        dynamic: Dynamic::None,
        dynamic_conditions: false,
        property_aliases: &[],
        rejected: &[],
        required: &[],
        allowed_values: &[],
        value_aliases: &[],
        service_properties: &[],
        expression_properties: &[],
        clear_when_empty: &[],
        terminate: &[],
    };

    /// Case-insensitive lookup of a declared property
    pub fn declared(&self, name: &str) -> Option<&'static str> {
        self.properties
            .iter()
            .find(|p| p.eq_ignore_ascii_case(name))
            .copied()
    }

    pub fn alias_for(&self, name: &str) -> Option<&'static str> {
        self.property_aliases
            .iter()
            .find(|(from, _)| from.eq_ignore_ascii_case(name))
            .map(|(_, to)| *to)
    }

    pub fn rejection(&self, name: &str) -> Option<&'static str> {
        self.rejected
            .iter()
            .find(|(p, _)| p.eq_ignore_ascii_case(name))
            .map(|(_, reason)| *reason)
    }

    pub fn allowed(&self, property: &str) -> Option<&'static [&'static str]> {
        self.allowed_values
            .iter()
            .find(|(p, _)| *p == property)
            .map(|(_, values)| *values)
    }

    pub fn value_alias(&self, property: &str, value: &str) -> Option<&'static str> {
        self.value_aliases
            .iter()
            .find(|(p, from, _)| *p == property && from.eq_ignore_ascii_case(value))
            .map(|(_, _, to)| *to)
    }

    pub fn is_expression(&self, property: &str) -> bool {
        self.expression_properties.contains(&property)
            || (self.dynamic == Dynamic::Expression && self.declared(property).is_none())
    }

    /// A user-defined property whose value is a routing condition
    pub fn is_condition(&self, property: &str) -> bool {
        self.dynamic_conditions && self.declared(property).is_none()
    }

    pub fn is_service_property(&self, property: &str) -> bool {
        self.service_properties.contains(&property)
    }
}

const HTTP_CONTEXT_MAP: Requirement = Requirement::Service {
    interface: "HttpContextMap",
    type_hint: "org.apache.nifi.http.StandardHttpContextMap",
};

static REGISTRY: Lazy<HashMap<UnitKind, SchemaRecord>> = Lazy::new(|| {
    HashMap::from([
        (
            UnitKind::GenerateFlowFile,
            SchemaRecord {
                properties: &[
                    "File Size",
                    "Batch Size",
                    "Data Format",
                    "Unique FlowFiles",
                    "Custom Text",
                    "Character Set",
                    "Mime Type",
                ],
                dynamic: Dynamic::Expression,
                property_aliases: &[("Text", "Custom Text"), ("Content", "Custom Text")],
                required: &[
                    ("File Size", Requirement::Default("0B")),
                    ("Batch Size", Requirement::Default("1")),
                    ("Data Format", Requirement::Default("Text")),
                    ("Unique FlowFiles", Requirement::Default("false")),
                ],
                allowed_values: &[("Data Format", &["Binary", "Text"])],
                expression_properties: &["Custom Text"],
                ..SchemaRecord::EMPTY
            },
        ),
        (
            UnitKind::LogAttribute,
            SchemaRecord {
                properties: &[
                    "Log Level",
                    "Log Payload",
                    "Attributes to Log",
                    "Attributes to Ignore",
                    "Log prefix",
                    "Character Set",
                ],
                property_aliases: &[("Level", "Log Level"), ("Prefix", "Log prefix")],
                required: &[
                    ("Log Level", Requirement::Default("info")),
                    ("Log Payload", Requirement::Default("false")),
                ],
                allowed_values: &[("Log Level", &["trace", "debug", "info", "warn", "error"])],
                value_aliases: &[("Log Level", "warning", "warn"), ("Log Level", "fatal", "error")],
                terminate: &["success"],
                ..SchemaRecord::EMPTY
            },
        ),
        (
            UnitKind::HandleHttpRequest,
            SchemaRecord {
                properties: &[
                    "Listening Port",
                    "Hostname",
                    "SSL Context Service",
                    "HTTP Context Map",
                    "Allowed Paths",
                    "Default URL Character Set",
                    "Allow GET",
                    "Allow POST",
                    "Allow PUT",
                    "Allow DELETE",
                    "Allow HEAD",
                    "Allow OPTIONS",
                    "Additional HTTP Methods",
                    "Client Authentication",
                ],
                property_aliases: &[
                    ("Port", "Listening Port"),
                    ("Context Map", "HTTP Context Map"),
                    ("Http Context Map Service", "HTTP Context Map"),
                    ("Path", "Allowed Paths"),
                ],
                rejected: &[("Base Path", "use 'Allowed Paths' to restrict request paths")],
                required: &[
                    ("Listening Port", Requirement::Default("80")),
                    ("HTTP Context Map", HTTP_CONTEXT_MAP),
                ],
                allowed_values: &[("Client Authentication", &["No Authentication", "Want Authentication", "Need Authentication"])],
                service_properties: &["HTTP Context Map", "SSL Context Service"],
                terminate: &["success", "failure"],
                ..SchemaRecord::EMPTY
            },
        ),
        (
            UnitKind::HandleHttpResponse,
            SchemaRecord {
                properties: &[
                    "HTTP Status Code",
                    "HTTP Context Map",
                    "Attributes to add to the HTTP Response (Regex)",
                ],
                dynamic: Dynamic::Expression,
                property_aliases: &[
                    ("Response Code", "HTTP Status Code"),
                    ("Status Code", "HTTP Status Code"),
                    ("Context Map", "HTTP Context Map"),
                ],
                rejected: &[("Response Body", "the response body is the flowfile content")],
                required: &[
                    ("HTTP Status Code", Requirement::Default("200")),
                    ("HTTP Context Map", HTTP_CONTEXT_MAP),
                ],
                service_properties: &["HTTP Context Map"],
                expression_properties: &["HTTP Status Code"],
                terminate: &["success", "failure"],
                ..SchemaRecord::EMPTY
            },
        ),
        (
            UnitKind::RouteOnAttribute,
            SchemaRecord {
                properties: &["Routing Strategy"],
                dynamic: Dynamic::Expression,
                dynamic_conditions: true,
                property_aliases: &[("Strategy", "Routing Strategy")],
                required: &[("Routing Strategy", Requirement::Default("Route to Property name"))],
                allowed_values: &[(
                    "Routing Strategy",
                    &[
                        "Route to Property name",
                        "Route to 'matched' if all match",
                        "Route to 'matched' if any matches",
                    ],
                )],
                value_aliases: &[
                    ("Routing Strategy", "route_to_property_name", "Route to Property name"),
                    ("Routing Strategy", "all", "Route to 'matched' if all match"),
                    ("Routing Strategy", "any", "Route to 'matched' if any matches"),
                ],
                terminate: &["unmatched"],
                ..SchemaRecord::EMPTY
            },
        ),
        (
            UnitKind::UpdateAttribute,
            SchemaRecord {
                properties: &[
                    "Delete Attributes Expression",
                    "Store State",
                    "Stateful Variables Initial Value",
                ],
                dynamic: Dynamic::Expression,
                allowed_values: &[("Store State", &["Do not store state", "Store state locally"])],
                ..SchemaRecord::EMPTY
            },
        ),
        (
            UnitKind::EvaluateJsonPath,
            SchemaRecord {
                properties: &[
                    "Destination",
                    "Return Type",
                    "Path Not Found Behavior",
                    "Null Value Representation",
                ],
                dynamic: Dynamic::Plain,
                required: &[
                    ("Destination", Requirement::Default("flowfile-attribute")),
                    ("Return Type", Requirement::Default("auto-detect")),
                ],
                allowed_values: &[
                    ("Destination", &["flowfile-content", "flowfile-attribute"]),
                    ("Return Type", &["auto-detect", "json", "scalar"]),
                    ("Path Not Found Behavior", &["ignore", "warn", "skip"]),
                ],
                value_aliases: &[
                    ("Destination", "attribute", "flowfile-attribute"),
                    ("Destination", "content", "flowfile-content"),
                    ("Return Type", "auto", "auto-detect"),
                ],
                terminate: &["unmatched", "failure"],
                ..SchemaRecord::EMPTY
            },
        ),
        (
            UnitKind::InvokeHttp,
            SchemaRecord {
                properties: &[
                    "HTTP Method",
                    "Remote URL",
                    "SSL Context Service",
                    "Connection Timeout",
                    "Read Timeout",
                    "Request Content-Type",
                    "Send Message Body",
                    "Response Body Attribute Name",
                ],
                dynamic: Dynamic::Expression,
                property_aliases: &[
                    ("URL", "Remote URL"),
                    ("Method", "HTTP Method"),
                    ("Content-Type", "Request Content-Type"),
                ],
                required: &[
                    ("HTTP Method", Requirement::Default("GET")),
                    ("Remote URL", Requirement::Mandatory),
                ],
                service_properties: &["SSL Context Service"],
                expression_properties: &["Remote URL", "HTTP Method", "Request Content-Type"],
                terminate: &["Original"],
                ..SchemaRecord::EMPTY
            },
        ),
        (
            UnitKind::PutFile,
            SchemaRecord {
                properties: &[
                    "Directory",
                    "Conflict Resolution Strategy",
                    "Create Missing Directories",
                    "Maximum File Count",
                    "Last Modified Time",
                    "Permissions",
                    "Owner",
                    "Group",
                ],
                property_aliases: &[("Path", "Directory"), ("Output Directory", "Directory")],
                required: &[
                    ("Directory", Requirement::Mandatory),
                    ("Conflict Resolution Strategy", Requirement::Default("fail")),
                    ("Create Missing Directories", Requirement::Default("true")),
                ],
                allowed_values: &[("Conflict Resolution Strategy", &["replace", "ignore", "fail"])],
                value_aliases: &[
                    ("Conflict Resolution Strategy", "overwrite", "replace"),
                    ("Conflict Resolution Strategy", "skip", "ignore"),
                ],
                expression_properties: &["Directory"],
                terminate: &["success", "failure"],
                ..SchemaRecord::EMPTY
            },
        ),
        (
            UnitKind::ExecuteScript,
            SchemaRecord {
                properties: &["Script Engine", "Script File", "Script Body", "Module Directory"],
                dynamic: Dynamic::Plain,
                required: &[("Script Engine", Requirement::Default("Groovy"))],
                clear_when_empty: &["Script File", "Module Directory"],
                terminate: &["success", "failure"],
                ..SchemaRecord::EMPTY
            },
        ),
    ])
});

/// Schema for a unit type; `None` for types outside the registry
pub fn schema_for(type_name: &str) -> Option<&'static SchemaRecord> {
    REGISTRY.get(&UnitKind::from_type(type_name))
}
