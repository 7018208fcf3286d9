/// Values of the Content-Format option (RFC 7252 section 12.3).
///
/// `Other` carries through any registered Content-Format number this crate
/// doesn't special-case, so callers never lose information round-tripping
/// an option they don't otherwise care about.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ContentFormat {
  TextPlain,
  LinkFormat,
  Xml,
  OctetStream,
  Json,
  Cbor,
  Other(u16),
}

impl From<u16> for ContentFormat {
  fn from(n: u16) -> Self {
    match n {
      | 0 => Self::TextPlain,
      | 40 => Self::LinkFormat,
      | 41 => Self::Xml,
      | 42 => Self::OctetStream,
      | 50 => Self::Json,
      | 60 => Self::Cbor,
      | n => Self::Other(n),
    }
  }
}

impl From<ContentFormat> for u16 {
  fn from(f: ContentFormat) -> u16 {
    match f {
      | ContentFormat::TextPlain => 0,
      | ContentFormat::LinkFormat => 40,
      | ContentFormat::Xml => 41,
      | ContentFormat::OctetStream => 42,
      | ContentFormat::Json => 50,
      | ContentFormat::Cbor => 60,
      | ContentFormat::Other(n) => n,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn round_trips() {
    for (n, f) in [(0, ContentFormat::TextPlain),
                   (40, ContentFormat::LinkFormat),
                   (41, ContentFormat::Xml),
                   (42, ContentFormat::OctetStream),
                   (50, ContentFormat::Json),
                   (60, ContentFormat::Cbor)]
    {
      assert_eq!(ContentFormat::from(n), f);
      assert_eq!(u16::from(f), n);
    }
  }

  #[test]
  fn unknown_format_preserved() {
    assert_eq!(ContentFormat::from(9999), ContentFormat::Other(9999));
    assert_eq!(u16::from(ContentFormat::Other(9999)), 9999);
  }
}
