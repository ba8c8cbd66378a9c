//! Schema 类型定义
//!
//! 声明式 Schema 树：字段名 -> {类型, 描述, 是否必填}，嵌套结构由 Object/Array 递归表达。
//! 由 registry 中的通用校验器解释执行，新增输出契约不需要新校验代码。

use serde_json::Value;

/// 字段类型：原始类型、数组与嵌套对象
#[derive(Debug, Clone)]
pub enum FieldType {
    /// 字符串
    Text,
    /// 数值（整数或浮点）
    Number,
    /// 布尔
    Bool,
    /// 元素同构的数组
    Array(Box<FieldType>),
    /// 嵌套对象，按内嵌 Schema 递归校验
    Object(Schema),
}

impl FieldType {
    /// 类型名（用于校验错误信息与 prompt 渲染）
    pub fn type_name(&self) -> String {
        match self {
            FieldType::Text => "string".to_string(),
            FieldType::Number => "number".to_string(),
            FieldType::Bool => "boolean".to_string(),
            FieldType::Array(inner) => format!("array of {}", inner.type_name()),
            FieldType::Object(schema) => format!("object ({})", schema.name),
        }
    }
}

/// 单个字段声明：名称、描述（供 LLM 理解契约）、类型、是否必填
#[derive(Debug, Clone)]
pub struct SchemaField {
    pub name: String,
    pub description: String,
    pub field_type: FieldType,
    pub required: bool,
}

impl SchemaField {
    pub fn required(name: impl Into<String>, field_type: FieldType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            field_type,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, field_type: FieldType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            field_type,
            required: false,
        }
    }
}

/// 命名 Schema：字段集合，作为任务输出契约注册到 SchemaRegistry
#[derive(Debug, Clone)]
pub struct Schema {
    pub name: String,
    pub fields: Vec<SchemaField>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: SchemaField) -> Self {
        self.fields.push(field);
        self
    }

    /// 校验 JSON 值是否满足本 Schema；错误信息带字段路径（如 companies[0].ticker）
    pub fn check(&self, value: &Value) -> Result<(), String> {
        check_object(self, value, self.name.as_str())
    }

    /// 渲染为 prompt 中的契约说明段落，告知 LLM 期望的字段与类型
    pub fn to_prompt_block(&self) -> String {
        let mut s = format!("Respond with a single JSON object matching `{}`:\n", self.name);
        render_fields(&mut s, &self.fields, 0);
        s
    }
}

fn render_fields(out: &mut String, fields: &[SchemaField], depth: usize) {
    let indent = "  ".repeat(depth);
    for f in fields {
        let req = if f.required { "required" } else { "optional" };
        out.push_str(&format!(
            "{}- {} ({}, {}): {}\n",
            indent,
            f.name,
            f.field_type.type_name(),
            req,
            f.description
        ));
        match &f.field_type {
            FieldType::Object(nested) => render_fields(out, &nested.fields, depth + 1),
            FieldType::Array(inner) => {
                if let FieldType::Object(nested) = inner.as_ref() {
                    render_fields(out, &nested.fields, depth + 1);
                }
            }
            _ => {}
        }
    }
}

fn check_object(schema: &Schema, value: &Value, path: &str) -> Result<(), String> {
    let obj = value
        .as_object()
        .ok_or_else(|| format!("{}: expected object, got {}", path, json_type_name(value)))?;

    for field in &schema.fields {
        let field_path = format!("{}.{}", path, field.name);
        match obj.get(&field.name) {
            None | Some(Value::Null) => {
                if field.required {
                    return Err(format!("{}: missing required field", field_path));
                }
            }
            Some(v) => check_type(&field.field_type, v, &field_path)?,
        }
    }
    Ok(())
}

fn check_type(field_type: &FieldType, value: &Value, path: &str) -> Result<(), String> {
    match field_type {
        FieldType::Text => {
            if !value.is_string() {
                return Err(format!("{}: expected string, got {}", path, json_type_name(value)));
            }
        }
        FieldType::Number => {
            if !value.is_number() {
                return Err(format!("{}: expected number, got {}", path, json_type_name(value)));
            }
        }
        FieldType::Bool => {
            if !value.is_boolean() {
                return Err(format!("{}: expected boolean, got {}", path, json_type_name(value)));
            }
        }
        FieldType::Array(inner) => {
            let items = value
                .as_array()
                .ok_or_else(|| format!("{}: expected array, got {}", path, json_type_name(value)))?;
            for (i, item) in items.iter().enumerate() {
                check_type(inner, item, &format!("{}[{}]", path, i))?;
            }
        }
        FieldType::Object(schema) => check_object(schema, value, path)?,
    }
    Ok(())
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
