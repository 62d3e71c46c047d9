use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::traits::Channel;
use crate::{BrokerError, BrokerResult};

/// 携带事件种类的属性名
pub const KIND_ATTRIBUTE: &str = "type";
pub const ID_ATTRIBUTE: &str = "id";
pub const SPECIALTY_ATTRIBUTE: &str = "specialty";

/// 属性值：单个字符串或字符串列表
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Text(String),
    List(Vec<String>),
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(value: Vec<String>) -> Self {
        AttributeValue::List(value)
    }
}

impl From<Vec<&str>> for AttributeValue {
    fn from(value: Vec<&str>) -> Self {
        AttributeValue::List(value.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for AttributeValue {
    fn from(value: &[&str]) -> Self {
        AttributeValue::List(value.iter().map(|s| s.to_string()).collect())
    }
}

/// 不可变的属性表，克隆只增加引用计数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(Arc<HashMap<String, AttributeValue>>);

impl Attributes {
    pub fn new(values: HashMap<String, AttributeValue>) -> Self {
        Self(Arc::new(values))
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.0.get(key)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(AttributeValue::Text(value)) => Some(value),
            _ => None,
        }
    }

    pub fn list(&self, key: &str) -> Option<&[String]> {
        match self.0.get(key) {
            Some(AttributeValue::List(values)) => Some(values),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn required_text(&self, key: &str) -> BrokerResult<String> {
        match self.0.get(key) {
            None => Err(BrokerError::protocol(format!("缺少必需属性 `{key}`"))),
            Some(AttributeValue::List(_)) => Err(BrokerError::protocol(format!(
                "属性 `{key}` 必须是字符串"
            ))),
            Some(AttributeValue::Text(value)) if value.trim().is_empty() => Err(
                BrokerError::protocol(format!("属性 `{key}` 不能为空")),
            ),
            Some(AttributeValue::Text(value)) => Ok(value.clone()),
        }
    }

    fn required_tags(&self, key: &str) -> BrokerResult<BTreeSet<String>> {
        let values = match self.0.get(key) {
            None => return Err(BrokerError::protocol(format!("缺少必需属性 `{key}`"))),
            Some(AttributeValue::Text(_)) => {
                return Err(BrokerError::protocol(format!(
                    "属性 `{key}` 必须是字符串列表"
                )))
            }
            Some(AttributeValue::List(values)) => values,
        };

        if values.is_empty() {
            return Err(BrokerError::protocol(format!("属性 `{key}` 至少需要一个专长")));
        }
        if values.iter().any(|tag| tag.trim().is_empty()) {
            return Err(BrokerError::protocol(format!("属性 `{key}` 包含空专长")));
        }

        Ok(values.iter().cloned().collect())
    }
}

impl<K, V> FromIterator<(K, V)> for Attributes
where
    K: Into<String>,
    V: Into<AttributeValue>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// 事件种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StaffOnDuty,
    StaffOffDuty,
    Order,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::StaffOnDuty => "staff.onduty",
            EventKind::StaffOffDuty => "staff.offduty",
            EventKind::Order => "order",
        }
    }
}

impl FromStr for EventKind {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "staff.onduty" => Ok(EventKind::StaffOnDuty),
            "staff.offduty" => Ok(EventKind::StaffOffDuty),
            "order" => Ok(EventKind::Order),
            other => Err(BrokerError::protocol(format!("未知的事件类型: {other}"))),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次入站事件：属性表加上通道
#[derive(Clone)]
pub struct Event {
    attributes: Attributes,
    channel: Arc<dyn Channel>,
}

impl Event {
    pub fn new(attributes: Attributes, channel: Arc<dyn Channel>) -> Self {
        Self {
            attributes,
            channel,
        }
    }

    /// 上岗事件
    pub fn on_duty(id: &str, specialties: &[&str], channel: Arc<dyn Channel>) -> Self {
        let attributes = [
            (KIND_ATTRIBUTE, AttributeValue::from(EventKind::StaffOnDuty.as_str())),
            (ID_ATTRIBUTE, AttributeValue::from(id)),
            (SPECIALTY_ATTRIBUTE, AttributeValue::from(specialties)),
        ];
        Self::new(attributes.into_iter().collect(), channel)
    }

    /// 下岗事件，通道不会被使用
    pub fn off_duty(id: &str, channel: Arc<dyn Channel>) -> Self {
        let attributes = [
            (KIND_ATTRIBUTE, AttributeValue::from(EventKind::StaffOffDuty.as_str())),
            (ID_ATTRIBUTE, AttributeValue::from(id)),
        ];
        Self::new(attributes.into_iter().collect(), channel)
    }

    pub fn order(specialty: &str, channel: Arc<dyn Channel>) -> Self {
        let attributes = [
            (KIND_ATTRIBUTE, AttributeValue::from(EventKind::Order.as_str())),
            (SPECIALTY_ATTRIBUTE, AttributeValue::from(specialty)),
        ];
        Self::new(attributes.into_iter().collect(), channel)
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    pub fn kind(&self) -> BrokerResult<EventKind> {
        self.attributes.required_text(KIND_ATTRIBUTE)?.parse()
    }

    /// 校验属性并转换为命令。失败时不产生任何副作用。
    pub fn into_command(self) -> BrokerResult<Command> {
        match self.kind()? {
            EventKind::StaffOnDuty => Ok(Command::OnDuty {
                id: self.attributes.required_text(ID_ATTRIBUTE)?,
                specialties: self.attributes.required_tags(SPECIALTY_ATTRIBUTE)?,
                channel: self.channel,
            }),
            EventKind::StaffOffDuty => Ok(Command::OffDuty {
                id: self.attributes.required_text(ID_ATTRIBUTE)?,
            }),
            EventKind::Order => Ok(Command::Order(OrderRequest {
                specialty: self.attributes.required_text(SPECIALTY_ATTRIBUTE)?,
                channel: self.channel,
            })),
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}

/// 订单请求，仅在一次分派期间存在
#[derive(Clone)]
pub struct OrderRequest {
    pub specialty: String,
    pub channel: Arc<dyn Channel>,
}

impl fmt::Debug for OrderRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderRequest")
            .field("specialty", &self.specialty)
            .finish_non_exhaustive()
    }
}

/// 解析后的事件
pub enum Command {
    OnDuty {
        id: String,
        specialties: BTreeSet<String>,
        channel: Arc<dyn Channel>,
    },
    OffDuty {
        id: String,
    },
    Order(OrderRequest),
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::OnDuty {
                id, specialties, ..
            } => f
                .debug_struct("OnDuty")
                .field("id", id)
                .field("specialties", specialties)
                .finish_non_exhaustive(),
            Command::OffDuty { id } => f.debug_struct("OffDuty").field("id", id).finish(),
            Command::Order(request) => f.debug_tuple("Order").field(request).finish(),
        }
    }
}

impl Command {
    pub fn kind(&self) -> EventKind {
        match self {
            Command::OnDuty { .. } => EventKind::StaffOnDuty,
            Command::OffDuty { .. } => EventKind::StaffOffDuty,
            Command::Order(_) => EventKind::Order,
        }
    }
}
