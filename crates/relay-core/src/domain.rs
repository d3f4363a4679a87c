/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// A file attached to the target release.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize)]
pub struct ReleaseAsset {
    pub id: u64,
    pub name: String,
    pub size: u64,
    pub browser_download_url: String,
}

/// The release that receives uploaded assets.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct Release {
    pub id: u64,
    pub tag_name: String,
    /// RFC 6570 template, e.g. `https://uploads.github.com/.../assets{?name,label}`.
    pub upload_url: String,
}
