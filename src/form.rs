use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::assets::AssetRegistry;
use crate::error::{ExplorerError, Result};
use crate::schema::{
    Operation, ParamLocation, PropertySpec, RequestBodySpec, SchemaHint, object_properties,
    schema_hint,
};
use crate::sources::SourceFile;

pub const ASSET_PARAM: &str = "asset_id";
pub const UPLOAD_PATH_SUFFIX: &str = "/upload-media";
pub const UPLOAD_FIELD: &str = "file";
pub const ASSET_PICKER_LIMIT: usize = 20;

pub fn is_upload_operation(op: &Operation) -> bool {
    op.path.ends_with(UPLOAD_PATH_SUFFIX)
}

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaShape {
    Primitive(SchemaHint),
    Enum(Vec<String>),
    Boolean,
    Binary,
    Object(Vec<PropertySpec>),
}

pub fn shape_of(hint: &SchemaHint) -> SchemaShape {
    if hint.schema_type.as_deref() == Some("boolean") {
        return SchemaShape::Boolean;
    }
    if !hint.enum_values.is_empty() {
        return SchemaShape::Enum(hint.enum_values.clone());
    }
    if hint.format.as_deref() == Some("binary") {
        return SchemaShape::Binary;
    }
    SchemaShape::Primitive(hint.clone())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetOption {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Widget {
    AssetPicker { options: Vec<AssetOption> },
    TriState,
    Choice { options: Vec<String> },
    Text { placeholder: String },
    File,
}

impl Widget {
    fn accepts(&self, value: &str) -> std::result::Result<(), String> {
        if value.is_empty() {
            return Ok(());
        }
        match self {
            Widget::TriState if value != "true" && value != "false" => {
                Err("expected true, false or empty".to_string())
            }
            Widget::Choice { options } if !options.iter().any(|o| o == value) => {
                Err(format!("expected one of: {}", options.join(", ")))
            }
            Widget::File => Err("file fields take a file, not text".to_string()),
            _ => Ok(()),
        }
    }
}

pub fn placeholder_for(hint: &SchemaHint) -> String {
    let ty = hint.schema_type.as_deref().unwrap_or("string");
    match hint.format.as_deref() {
        Some(format) => format!("{ty} ({format})"),
        None => ty.to_string(),
    }
}

pub fn param_widget(shape: &SchemaShape, hint: &SchemaHint) -> Widget {
    match shape {
        SchemaShape::Boolean => Widget::TriState,
        SchemaShape::Enum(options) => Widget::Choice {
            options: options.clone(),
        },
        SchemaShape::Primitive(_) | SchemaShape::Binary | SchemaShape::Object(_) => Widget::Text {
            placeholder: placeholder_for(hint),
        },
    }
}

pub fn field_widget(shape: &SchemaShape, hint: &SchemaHint) -> Widget {
    match shape {
        SchemaShape::Binary => Widget::File,
        _ => Widget::Text {
            placeholder: placeholder_for(hint),
        },
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamField {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    pub description: Option<String>,
    pub widget: Widget,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BodyField {
    pub name: String,
    pub required: bool,
    pub widget: Widget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldEncoding {
    Multipart,
    UrlEncoded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BodySection {
    FileUpload { field: String },
    Fields {
        encoding: FieldEncoding,
        fields: Vec<BodyField>,
    },
    FreeFields { encoding: FieldEncoding },
    Json {
        content_type: String,
        prefill: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormDescriptor {
    pub operation: String,
    pub method: String,
    pub path: String,
    pub params: Vec<ParamField>,
    pub body: Option<BodySection>,
}

impl FormDescriptor {
    pub fn param(&self, name: &str, location: ParamLocation) -> Option<&ParamField> {
        self.params
            .iter()
            .find(|p| p.name == name && p.location == location)
    }
}

pub fn build(op: &Operation, registry: &AssetRegistry) -> FormDescriptor {
    let params = op
        .params
        .iter()
        .map(|param| {
            let widget = if param.name == ASSET_PARAM {
                Widget::AssetPicker {
                    options: asset_options(registry),
                }
            } else {
                param_widget(&shape_of(&param.schema), &param.schema)
            };
            ParamField {
                name: param.name.clone(),
                location: param.location,
                required: param.required,
                description: param.description.clone(),
                widget,
            }
        })
        .collect();

    let body = if is_upload_operation(op) {
        Some(BodySection::FileUpload {
            field: UPLOAD_FIELD.to_string(),
        })
    } else {
        op.request_body.as_ref().and_then(body_section)
    };

    FormDescriptor {
        operation: op.id.clone(),
        method: op.method.clone(),
        path: op.path.clone(),
        params,
        body,
    }
}

fn asset_options(registry: &AssetRegistry) -> Vec<AssetOption> {
    registry
        .recent(ASSET_PICKER_LIMIT)
        .iter()
        .map(|asset| AssetOption {
            value: asset.asset_id.clone(),
            label: asset.label(),
        })
        .collect()
}

fn body_section(spec: &RequestBodySpec) -> Option<BodySection> {
    let content_type = spec.content_type()?;
    let lowered = content_type.to_ascii_lowercase();

    if lowered.contains("json") {
        return Some(BodySection::Json {
            content_type: content_type.to_string(),
            prefill: json_prefill(spec),
        });
    }

    let encoding = if lowered.starts_with("multipart/form-data") {
        FieldEncoding::Multipart
    } else if lowered.starts_with("application/x-www-form-urlencoded") {
        FieldEncoding::UrlEncoded
    } else {
        log::debug!("no body widget for content type {content_type}");
        return None;
    };

    let props = match spec.schema.as_ref().map(shape_of_schema) {
        Some(SchemaShape::Object(props)) if !props.is_empty() => props,
        _ => return Some(BodySection::FreeFields { encoding }),
    };
    let fields = props
        .into_iter()
        .map(|prop| {
            let widget = match encoding {
                FieldEncoding::Multipart => field_widget(&shape_of(&prop.schema), &prop.schema),
                FieldEncoding::UrlEncoded => Widget::Text {
                    placeholder: placeholder_for(&prop.schema),
                },
            };
            BodyField {
                name: prop.name,
                required: prop.required,
                widget,
            }
        })
        .collect();
    Some(BodySection::Fields { encoding, fields })
}

pub fn shape_of_schema(schema: &Value) -> SchemaShape {
    let props = object_properties(schema);
    if props.is_empty() {
        shape_of(&schema_hint(schema))
    } else {
        SchemaShape::Object(props)
    }
}

fn json_prefill(spec: &RequestBodySpec) -> Option<String> {
    let explicit = spec
        .example
        .clone()
        .or_else(|| spec.schema.as_ref().and_then(|s| s.get("example")).cloned());
    if let Some(example) = explicit {
        return serde_json::to_string_pretty(&example).ok();
    }
    spec.schema.as_ref().and_then(synthesize_json_example)
}

/// Builds a pretty-printed JSON object with a zero value for every
/// declared top-level property. Nested objects are not expanded. Returns
/// `None` when the schema has no usable properties.
pub fn synthesize_json_example(schema: &Value) -> Option<String> {
    let props = schema.get("properties")?.as_object()?;
    let mut out = Map::new();
    for (name, prop) in props {
        let value = match schema_hint(prop).schema_type.as_deref() {
            Some("string") => Value::String(String::new()),
            Some("integer") | Some("number") => Value::from(0),
            Some("boolean") => Value::Bool(false),
            Some("array") => Value::Array(Vec::new()),
            _ => Value::Null,
        };
        out.insert(name.clone(), value);
    }
    serde_json::to_string_pretty(&Value::Object(out)).ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetInputMode {
    #[default]
    Select,
    Text,
}

#[derive(Debug, Default)]
pub struct FileSelection {
    file: Option<SourceFile>,
}

impl FileSelection {
    pub fn select(&mut self, file: SourceFile) {
        log::debug!("selected {}", file.label());
        self.file = Some(file);
    }

    pub fn remove(&mut self) -> Option<SourceFile> {
        self.file.take()
    }

    pub fn file(&self) -> Option<&SourceFile> {
        self.file.as_ref()
    }

    pub fn label(&self) -> Option<String> {
        self.file.as_ref().map(|f| f.label())
    }
}

#[derive(Debug)]
pub enum BodyState {
    None,
    Upload {
        field: String,
        selection: FileSelection,
    },
    Fields {
        encoding: FieldEncoding,
        /// Declared fields, or `None` when the user picks the names.
        declared: Option<Vec<BodyField>>,
        text: BTreeMap<String, String>,
        files: BTreeMap<String, FileSelection>,
    },
    Json {
        buffer: String,
    },
}

#[derive(Debug)]
pub struct FormState {
    operation: String,
    params: Vec<ParamField>,
    values: BTreeMap<(String, ParamLocation), String>,
    asset_mode: AssetInputMode,
    body: BodyState,
}

impl FormState {
    pub fn new(descriptor: &FormDescriptor) -> Self {
        let body = match &descriptor.body {
            None => BodyState::None,
            Some(BodySection::FileUpload { field }) => BodyState::Upload {
                field: field.clone(),
                selection: FileSelection::default(),
            },
            Some(BodySection::Fields { encoding, fields }) => BodyState::Fields {
                encoding: *encoding,
                declared: Some(fields.clone()),
                text: BTreeMap::new(),
                files: BTreeMap::new(),
            },
            Some(BodySection::FreeFields { encoding }) => BodyState::Fields {
                encoding: *encoding,
                declared: None,
                text: BTreeMap::new(),
                files: BTreeMap::new(),
            },
            Some(BodySection::Json { prefill, .. }) => BodyState::Json {
                buffer: prefill.clone().unwrap_or_default(),
            },
        };
        Self {
            operation: descriptor.operation.clone(),
            params: descriptor.params.clone(),
            values: BTreeMap::new(),
            asset_mode: AssetInputMode::default(),
            body,
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Sets a parameter by name. When path and query share a name, the
    /// path parameter wins; use [`FormState::set_param_at`] to be explicit.
    pub fn set_param(&mut self, name: &str, value: &str) -> Result<()> {
        let location = self
            .params
            .iter()
            .filter(|p| p.name == name)
            .map(|p| p.location)
            .min()
            .ok_or_else(|| ExplorerError::invalid_input(name, "no such parameter"))?;
        self.set_param_at(name, location, value)
    }

    pub fn set_param_at(&mut self, name: &str, location: ParamLocation, value: &str) -> Result<()> {
        let field = self
            .params
            .iter()
            .find(|p| p.name == name && p.location == location)
            .ok_or_else(|| {
                ExplorerError::invalid_input(name, format!("no {} parameter", location.as_str()))
            })?;
        field
            .widget
            .accepts(value)
            .map_err(|reason| ExplorerError::invalid_input(name, reason))?;
        self.values
            .insert((name.to_string(), location), value.to_string());
        Ok(())
    }

    pub fn param_value(&self, name: &str, location: ParamLocation) -> &str {
        self.values
            .get(&(name.to_string(), location))
            .map(|v| v.as_str())
            .unwrap_or("")
    }

    pub fn param_values(&self, location: ParamLocation) -> Vec<(&str, &str)> {
        self.params
            .iter()
            .filter(|p| p.location == location)
            .map(|p| (p.name.as_str(), self.param_value(&p.name, location)))
            .filter(|(_, v)| !v.is_empty())
            .collect()
    }

    pub fn asset_mode(&self) -> AssetInputMode {
        self.asset_mode
    }

    /// Switches between picker and free text. The value is shared by both
    /// modes, so nothing typed or picked is lost.
    pub fn toggle_asset_mode(&mut self) -> AssetInputMode {
        self.asset_mode = match self.asset_mode {
            AssetInputMode::Select => AssetInputMode::Text,
            AssetInputMode::Text => AssetInputMode::Select,
        };
        self.asset_mode
    }

    pub fn pick_asset(&mut self, index: usize) -> Result<&str> {
        let field = self
            .params
            .iter()
            .find(|p| p.name == ASSET_PARAM)
            .ok_or_else(|| ExplorerError::invalid_input(ASSET_PARAM, "operation has no asset parameter"))?;
        let Widget::AssetPicker { options } = &field.widget else {
            return Err(ExplorerError::invalid_input(ASSET_PARAM, "not an asset picker"));
        };
        let option = options.get(index).ok_or_else(|| {
            ExplorerError::invalid_input(
                ASSET_PARAM,
                format!("only {} recent assets available", options.len()),
            )
        })?;
        let key = (ASSET_PARAM.to_string(), field.location);
        self.values.insert(key.clone(), option.value.clone());
        self.asset_mode = AssetInputMode::Select;
        Ok(self.values[&key].as_str())
    }

    pub fn body(&self) -> &BodyState {
        &self.body
    }

    pub fn set_body_text(&mut self, text: &str) -> Result<()> {
        match &mut self.body {
            BodyState::Json { buffer } => {
                *buffer = text.to_string();
                Ok(())
            }
            _ => Err(ExplorerError::invalid_input("body", "operation has no JSON body")),
        }
    }

    pub fn set_field(&mut self, name: &str, value: &str) -> Result<()> {
        let BodyState::Fields { declared, text, .. } = &mut self.body else {
            return Err(ExplorerError::invalid_input(name, "operation has no form fields"));
        };
        if let Some(fields) = declared {
            let field = fields
                .iter()
                .find(|f| f.name == name)
                .ok_or_else(|| ExplorerError::invalid_input(name, "no such field"))?;
            field
                .widget
                .accepts(value)
                .map_err(|reason| ExplorerError::invalid_input(name, reason))?;
        }
        text.insert(name.to_string(), value.to_string());
        Ok(())
    }

    pub fn attach_file(&mut self, name: &str, file: SourceFile) -> Result<()> {
        match &mut self.body {
            BodyState::Upload { field, selection } => {
                if name != field.as_str() {
                    return Err(ExplorerError::invalid_input(
                        name,
                        format!("upload takes a single file field named {field}"),
                    ));
                }
                selection.select(file);
                Ok(())
            }
            BodyState::Fields {
                encoding: FieldEncoding::Multipart,
                declared,
                files,
                ..
            } => {
                if let Some(fields) = declared {
                    let is_file = fields
                        .iter()
                        .any(|f| f.name == name && f.widget == Widget::File);
                    if !is_file {
                        return Err(ExplorerError::invalid_input(name, "not a file field"));
                    }
                }
                files.entry(name.to_string()).or_default().select(file);
                Ok(())
            }
            _ => Err(ExplorerError::invalid_input(name, "operation takes no files")),
        }
    }

    pub fn remove_file(&mut self, name: &str) -> Option<SourceFile> {
        match &mut self.body {
            BodyState::Upload { field, selection } if field.as_str() == name => selection.remove(),
            BodyState::Fields { files, .. } => files.get_mut(name).and_then(|s| s.remove()),
            _ => None,
        }
    }

    pub fn upload_selection(&self) -> Option<&FileSelection> {
        match &self.body {
            BodyState::Upload { selection, .. } => Some(selection),
            _ => None,
        }
    }
}
