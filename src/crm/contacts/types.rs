//! 联系人 API DTO

use serde::{Deserialize, Deserializer, Serialize};

/// 反序列化数组字段，处理 null 值
fn deserialize_vec_or_null<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let opt = Option::<Vec<T>>::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

/// Google 联系人（服务端整理后的结构，导入时原样回传）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoogleContact {
    #[serde(default)]
    pub resource_name: Option<String>,
    /// 显示名，没有名字时服务端填 `No Name`
    #[serde(default)]
    pub names: String,
    #[serde(default, deserialize_with = "deserialize_vec_or_null")]
    pub email_addresses: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_vec_or_null")]
    pub phone_numbers: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_vec_or_null")]
    pub addresses: Vec<String>,
    /// 所属分组的 resourceName
    #[serde(default, deserialize_with = "deserialize_vec_or_null")]
    pub groups: Vec<String>,
}

/// 联系人分组
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactGroup {
    #[serde(rename = "resourceName")]
    pub resource_name: String,
    pub name: String,
}

/// `contacts/list` 响应
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ContactsListResp {
    #[serde(default, deserialize_with = "deserialize_vec_or_null")]
    pub contacts: Vec<GoogleContact>,
    #[serde(default, deserialize_with = "deserialize_vec_or_null")]
    pub groups: Vec<ContactGroup>,
}

/// `contacts/list`、`contacts/sync` 请求体
#[derive(Debug, Clone, Serialize)]
pub struct AccessTokenReq<'a> {
    pub access_token: &'a str,
}

/// 已导入到 CRM 的联系人
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImportedPerson {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// `contacts/import` 响应
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImportContactResp {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub person: Option<ImportedPerson>,
}

/// `contacts/check-import/{resource}` 响应
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ImportStatus {
    #[serde(default)]
    pub imported: bool,
    #[serde(default)]
    pub person: Option<ImportedPerson>,
}

/// 错误响应，服务端使用 `error` 或 `message` 字段
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    pub(crate) fn into_message(self) -> Option<String> {
        self.message.or(self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_response_tolerates_null_arrays() {
        let resp: ContactsListResp = serde_json::from_str(
            r#"{
                "contacts": [{
                    "resource_name": "people/c1",
                    "names": "Grace",
                    "email_addresses": ["grace@example.com"],
                    "phone_numbers": null,
                    "addresses": [],
                    "groups": ["contactGroups/friends"]
                }],
                "groups": [{"resourceName": "contactGroups/friends", "name": "Friends"}]
            }"#,
        )
        .unwrap();
        assert_eq!(resp.contacts[0].names, "Grace");
        assert!(resp.contacts[0].phone_numbers.is_empty());
        assert_eq!(resp.groups[0].name, "Friends");
    }
}
