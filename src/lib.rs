// 该文件是 Shanan （山南西风） 项目的一部分。
// src/lib.rs - 库主文件
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

pub mod backend;
pub mod config;
pub mod detector;
pub mod fps;
pub mod frame;
pub mod input;
pub mod output;
pub mod pipeline;
pub mod task;

pub trait FromUrl {
  type Error;
  fn from_url(url: &url::Url) -> Result<Self, Self::Error>
  where
    Self: Sized;
}

pub trait FromUrlWithScheme: FromUrl {
  const SCHEME: &'static str;
}

/// URL 所指的本地路径：解码后的 host 与 path 拼接
///
/// `scheme:///abs/file` 得到 `/abs/file`，`scheme://rel/file` 得到 `rel/file`。
pub(crate) fn url_location(url: &url::Url) -> Result<String, std::string::FromUtf8Error> {
  let path = urlencoding::decode(url.path())?;
  Ok(match url.host_str().filter(|host| !host.is_empty()) {
    Some(host) => format!("{}{}", urlencoding::decode(host)?, path),
    None => path.into_owned(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn location_joins_host_and_path() {
    let url = url::Url::parse("record:///tmp/a%20b.jsonl").unwrap();
    assert_eq!(url_location(&url).unwrap(), "/tmp/a b.jsonl");
    let url = url::Url::parse("image://pictures/cat.png?repeat=2").unwrap();
    assert_eq!(url_location(&url).unwrap(), "pictures/cat.png");
    let url = url::Url::parse("record://out.jsonl").unwrap();
    assert_eq!(url_location(&url).unwrap(), "out.jsonl");
  }
}
