/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Wire representation of the v2 broker protocol.
//!
//! URL minting requests are XML documents POSTed to the broker endpoint;
//! multipart finalization is a form POST. The three request shapes are a
//! batch of object keys, a single object key with optional digest/TTL, and a
//! multipart request carrying per-part digests.

use crate::error::{self, Error};
use crate::types::{PresignedUrl, UrlPart};
use serde::{Deserialize, Serialize};

/// Protocol version sent with every minting request.
pub(crate) const PROTOCOL_VERSION: &str = "v2";

/// Form parameter names for multipart finalization.
pub(crate) const OBJECT_KEY_PARAM: &str = "OBJECT_KEY";
pub(crate) const OBJECT_KEY_BASE64_PARAM: &str = "OBJECT_KEY_BASE64";
pub(crate) const FINISH_UPLOAD_PARAM: &str = "FINISH_UPLOAD";
pub(crate) const UPLOAD_SUCCESSFUL_PARAM: &str = "UPLOAD_SUCCESSFUL";
pub(crate) const ETAGS_PARAM: &str = "ETAGS";

#[derive(Debug, Serialize)]
#[serde(rename = "request")]
pub(crate) struct UrlListRequest {
    #[serde(rename = "@version")]
    version: &'static str,
    #[serde(rename = "objectKeys", skip_serializing_if = "Option::is_none")]
    object_keys: Option<ObjectKeys>,
    #[serde(rename = "objectKey", skip_serializing_if = "Option::is_none")]
    object_key: Option<SingleKey>,
    #[serde(rename = "multipart", skip_serializing_if = "Option::is_none")]
    multipart: Option<Multipart>,
}

#[derive(Debug, Serialize)]
struct ObjectKeys {
    #[serde(rename = "key")]
    keys: Vec<Key>,
}

#[derive(Debug, Serialize)]
struct Key {
    #[serde(rename = "@digest", skip_serializing_if = "Option::is_none")]
    digest: Option<String>,
    #[serde(rename = "$text")]
    key: String,
}

#[derive(Debug, Serialize)]
struct SingleKey {
    #[serde(rename = "@digest", skip_serializing_if = "Option::is_none")]
    digest: Option<String>,
    #[serde(rename = "@ttl", skip_serializing_if = "Option::is_none")]
    ttl: Option<u64>,
    #[serde(rename = "$text")]
    key: String,
}

#[derive(Debug, Serialize)]
struct Multipart {
    #[serde(rename = "@objectKey")]
    object_key: String,
    #[serde(rename = "@uploadId", skip_serializing_if = "Option::is_none")]
    upload_id: Option<String>,
    #[serde(rename = "@ttl", skip_serializing_if = "Option::is_none")]
    ttl: Option<u64>,
    #[serde(rename = "digest", skip_serializing_if = "Vec::is_empty")]
    digests: Vec<String>,
}

impl UrlListRequest {
    pub(crate) fn for_object_keys<'a>(
        keys: impl IntoIterator<Item = (&'a str, Option<&'a str>)>,
    ) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            object_keys: Some(ObjectKeys {
                keys: keys
                    .into_iter()
                    .map(|(key, digest)| Key {
                        digest: digest.map(str::to_string),
                        key: key.to_string(),
                    })
                    .collect(),
            }),
            object_key: None,
            multipart: None,
        }
    }

    pub(crate) fn for_single_key(key: &str, digest: Option<&str>, ttl_seconds: Option<u64>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            object_keys: None,
            object_key: Some(SingleKey {
                digest: digest.map(str::to_string),
                ttl: ttl_seconds,
                key: key.to_string(),
            }),
            multipart: None,
        }
    }

    pub(crate) fn for_multipart(
        key: &str,
        digests: &[String],
        upload_id: Option<&str>,
        ttl_seconds: Option<u64>,
    ) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            object_keys: None,
            object_key: None,
            multipart: Some(Multipart {
                object_key: key.to_string(),
                upload_id: upload_id.map(str::to_string),
                ttl: ttl_seconds,
                digests: digests.to_vec(),
            }),
        }
    }

    pub(crate) fn to_xml(&self) -> Result<String, Error> {
        quick_xml::se::to_string(self).map_err(error::broker_shape)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename = "presignedUrlListResponse")]
pub(crate) struct UrlListResponse {
    #[serde(rename = "presignedUrl", default)]
    presigned_urls: Vec<PresignedUrlDto>,
}

#[derive(Debug, Deserialize)]
struct PresignedUrlDto {
    #[serde(rename = "@objectKey")]
    object_key: String,
    #[serde(rename = "@uploadId")]
    upload_id: Option<String>,
    #[serde(rename = "@multipart", default)]
    multipart: bool,
    #[serde(rename = "url", default)]
    urls: Vec<UrlDto>,
}

#[derive(Debug, Deserialize)]
struct UrlDto {
    #[serde(rename = "@partNumber")]
    part_number: u32,
    #[serde(rename = "$text")]
    url: String,
}

impl UrlListResponse {
    pub(crate) fn parse(body: &str) -> Result<Self, Error> {
        quick_xml::de::from_str(body)
            .map_err(|e| error::broker_shape(format!("malformed broker response: {e}")))
    }

    pub(crate) fn into_urls(self) -> Result<Vec<PresignedUrl>, Error> {
        self.presigned_urls
            .into_iter()
            .map(PresignedUrlDto::into_url)
            .collect()
    }
}

impl PresignedUrlDto {
    fn into_url(self) -> Result<PresignedUrl, Error> {
        let mut parts: Vec<UrlPart> = self
            .urls
            .into_iter()
            .map(|u| UrlPart::new(u.part_number, u.url))
            .collect();
        parts.sort_by_key(|p| p.part_number());

        if parts.is_empty() {
            return Err(error::broker_shape(format!(
                "no presigned urls returned for object key '{}'",
                self.object_key
            )));
        }
        if parts.iter().any(|p| p.part_number() < 1) {
            return Err(error::broker_shape(format!(
                "invalid part number returned for object key '{}'",
                self.object_key
            )));
        }
        if self.multipart && self.upload_id.as_deref().unwrap_or_default().is_empty() {
            return Err(error::broker_shape(format!(
                "multipart response for object key '{}' is missing an upload id",
                self.object_key
            )));
        }
        Ok(PresignedUrl::new(
            self.object_key,
            self.upload_id.filter(|id| !id.is_empty()),
            self.multipart,
            parts,
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn batch_request_shape() {
        let xml = UrlListRequest::for_object_keys([
            ("build-42/a.txt", Some("aa11")),
            ("build-42/b.txt", None),
        ])
        .to_xml()
        .unwrap();
        assert_eq!(
            xml,
            "<request version=\"v2\"><objectKeys>\
             <key digest=\"aa11\">build-42/a.txt</key>\
             <key>build-42/b.txt</key>\
             </objectKeys></request>"
        );
    }

    #[test]
    fn single_key_request_shape() {
        let xml = UrlListRequest::for_single_key("build-42/a.txt", Some("aa11"), Some(120))
            .to_xml()
            .unwrap();
        assert_eq!(
            xml,
            "<request version=\"v2\">\
             <objectKey digest=\"aa11\" ttl=\"120\">build-42/a.txt</objectKey>\
             </request>"
        );
    }

    #[test]
    fn multipart_request_shape() {
        let xml = UrlListRequest::for_multipart(
            "build-42/big.bin",
            &["d1".to_string(), "d2".to_string()],
            Some("upload-7"),
            None,
        )
        .to_xml()
        .unwrap();
        assert_eq!(
            xml,
            "<request version=\"v2\">\
             <multipart objectKey=\"build-42/big.bin\" uploadId=\"upload-7\">\
             <digest>d1</digest><digest>d2</digest>\
             </multipart></request>"
        );
    }

    #[test]
    fn parses_regular_response() {
        let body = "<presignedUrlListResponse>\
            <presignedUrl objectKey=\"build-42/a.txt\" multipart=\"false\">\
            <url partNumber=\"1\">https://s3.example.com/a?sig=1</url>\
            </presignedUrl>\
            </presignedUrlListResponse>";
        let urls = UrlListResponse::parse(body).unwrap().into_urls().unwrap();
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].object_key(), "build-42/a.txt");
        assert!(!urls[0].is_multipart());
        assert_eq!(urls[0].parts().len(), 1);
        assert_eq!(urls[0].parts()[0].part_number(), 1);
    }

    #[test]
    fn parses_multipart_response_and_orders_parts() {
        let body = "<presignedUrlListResponse>\
            <presignedUrl objectKey=\"k\" uploadId=\"u-1\" multipart=\"true\">\
            <url partNumber=\"2\">https://s3/p2</url>\
            <url partNumber=\"1\">https://s3/p1</url>\
            <url partNumber=\"3\">https://s3/p3</url>\
            </presignedUrl>\
            </presignedUrlListResponse>";
        let urls = UrlListResponse::parse(body).unwrap().into_urls().unwrap();
        assert_eq!(urls[0].upload_id(), Some("u-1"));
        let numbers: Vec<u32> = urls[0].parts().iter().map(|p| p.part_number()).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn multipart_without_upload_id_is_malformed() {
        let body = "<presignedUrlListResponse>\
            <presignedUrl objectKey=\"k\" multipart=\"true\">\
            <url partNumber=\"1\">https://s3/p1</url>\
            </presignedUrl>\
            </presignedUrlListResponse>";
        assert!(UrlListResponse::parse(body).unwrap().into_urls().is_err());
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(UrlListResponse::parse("<not-xml").is_err());
    }

    #[test]
    fn empty_url_list_is_malformed() {
        let body = "<presignedUrlListResponse>\
            <presignedUrl objectKey=\"k\" multipart=\"false\"/>\
            </presignedUrlListResponse>";
        assert!(UrlListResponse::parse(body).unwrap().into_urls().is_err());
    }
}
