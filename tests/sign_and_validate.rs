use std::collections::BTreeMap;

use httpsig::{
    HeaderUsage, HttpMessageAdapter, KeyConfig, KeyManager, MacAlgorithm, MessageContext,
    RequestTarget, SignatureOptions, SignatureScheme, TimestampOptions,
};

const HTTP_REQUEST: &[u8] = br#"POST /foo?param=value&pet=dog HTTP/1.1
Host: example.com
Date: Sun, 05 Jan 2014 21:31:40 GMT
Content-Type: application/json
Content-Length: 18

{"hello": "world"}"#;

struct RawRequest {
    method: String,
    path: String,
    headers: BTreeMap<String, Vec<String>>,
}

impl HttpMessageAdapter for RawRequest {
    fn header_values(&self, name: &str) -> Option<Vec<String>> {
        self.headers.get(&name.to_ascii_lowercase()).cloned()
    }

    fn request_target(&self) -> Option<RequestTarget> {
        Some(RequestTarget {
            method: self.method.clone(),
            path: self.path.clone(),
        })
    }
}

fn parse_request(buf: &[u8]) -> (RawRequest, Vec<u8>) {
    let mut raw_headers = [httparse::EMPTY_HEADER; 64];
    let mut req = httparse::Request::new(&mut raw_headers);
    let bytes_parsed = req.parse(buf).expect("failed to parse request").unwrap();

    let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for header in req.headers.iter() {
        if header.name.is_empty() {
            continue;
        }
        let value = std::str::from_utf8(header.value).unwrap().to_owned();
        headers
            .entry(header.name.to_ascii_lowercase())
            .or_default()
            .push(value);
    }

    let request = RawRequest {
        method: req.method.unwrap().to_owned(),
        path: req.path.unwrap().to_owned(),
        headers,
    };
    (request, buf[bytes_parsed..].to_vec())
}

fn full_header_options() -> SignatureOptions {
    let mut request_headers = httpsig::HeaderMap::new();
    for name in [
        "(request-target)",
        "host",
        "date",
        "content-type",
        "digest",
        "content-length",
    ] {
        request_headers.insert(name.to_owned(), HeaderUsage::Both);
    }
    SignatureOptions {
        request_headers,
        response_headers: httpsig::HeaderMap::new(),
        calculate_digest: true,
    }
}

fn manager(options: SignatureOptions) -> KeyManager {
    KeyManager::from_key(
        httpsig::SUPPORTED_VERSION,
        "Test",
        KeyConfig::Secret {
            mac_algorithm: MacAlgorithm::HmacSha256,
            key_material: b"a shared secret, known only to the two parties".to_vec(),
        },
        options,
    )
    .unwrap()
}

#[tokio::test]
async fn sign_then_verify_round_trip_with_full_headers() {
    let manager = manager(full_header_options());
    let (mut request, body) = parse_request(HTTP_REQUEST);

    let key = manager
        .get_key("Test", SignatureScheme::HmacSha256)
        .await
        .unwrap();
    let digest_header = key.create_digest_header(&body);
    request
        .headers
        .entry("digest".to_owned())
        .or_default()
        .push(digest_header);

    let ctx = MessageContext::with_timestamps(
        &request,
        TimestampOptions {
            created: Some(1_388_964_700),
            expires: None,
        },
    );
    let signature_header = key.sign_request(&ctx).unwrap();
    request
        .headers
        .entry("signature".to_owned())
        .or_default()
        .push(signature_header);

    let verify_ctx = MessageContext::new(&request);
    manager
        .verify_request(&verify_ctx, Some(1_388_964_730_000))
        .await
        .unwrap();
}

#[tokio::test]
async fn tampering_with_a_signed_header_invalidates_the_signature() {
    let manager = manager(full_header_options());
    let (mut request, body) = parse_request(HTTP_REQUEST);

    let key = manager
        .get_key("Test", SignatureScheme::HmacSha256)
        .await
        .unwrap();
    let digest_header = key.create_digest_header(&body);
    request
        .headers
        .entry("digest".to_owned())
        .or_default()
        .push(digest_header);

    let ctx = MessageContext::with_timestamps(
        &request,
        TimestampOptions {
            created: Some(1_388_964_700),
            expires: None,
        },
    );
    let signature_header = key.sign_request(&ctx).unwrap();
    request
        .headers
        .entry("signature".to_owned())
        .or_default()
        .push(signature_header);

    // Flip the request after it has been signed.
    request.headers.insert(
        "content-type".to_owned(),
        vec!["text/plain".to_owned()],
    );

    let verify_ctx = MessageContext::new(&request);
    let err = manager
        .verify_request(&verify_ctx, Some(1_388_964_730_000))
        .await
        .unwrap_err();
    assert!(err.is_verification());
}

#[tokio::test]
async fn tampered_digest_header_fails_the_mac_check() {
    let manager = manager(full_header_options());
    let (mut request, body) = parse_request(HTTP_REQUEST);

    let key = manager
        .get_key("Test", SignatureScheme::HmacSha256)
        .await
        .unwrap();
    let digest_header = key.create_digest_header(&body);
    request
        .headers
        .entry("digest".to_owned())
        .or_default()
        .push(digest_header);

    let ctx = MessageContext::with_timestamps(
        &request,
        TimestampOptions {
            created: Some(1_388_964_700),
            expires: None,
        },
    );
    let signature_header = key.sign_request(&ctx).unwrap();
    request
        .headers
        .entry("signature".to_owned())
        .or_default()
        .push(signature_header);

    // Swap in a digest for a different body, after signing. `digest` is
    // part of the signed header set, so the MAC check catches this even
    // though nobody re-hashes the body here.
    let wrong_digest = key.create_digest_header(b"goodbye, world");
    request
        .headers
        .insert("digest".to_owned(), vec![wrong_digest]);

    let verify_ctx = MessageContext::new(&request);
    let err = manager
        .verify_request(&verify_ctx, Some(1_388_964_730_000))
        .await
        .unwrap_err();
    assert!(err.is_verification());
}

#[tokio::test]
async fn verify_digest_header_catches_a_body_that_does_not_match() {
    let manager = KeyManager::from_key(
        httpsig::SUPPORTED_VERSION,
        "Test",
        KeyConfig::Secret {
            mac_algorithm: MacAlgorithm::HmacSha256,
            key_material: b"a shared secret, known only to the two parties".to_vec(),
        },
        SignatureOptions::default(),
    )
    .unwrap();
    let key = manager
        .get_key("Test", SignatureScheme::HmacSha256)
        .await
        .unwrap();

    let header = key.create_digest_header(b"the original body");
    assert!(key.verify_digest_header(b"the original body", &header).is_ok());
    assert!(key
        .verify_digest_header(b"a substituted body", &header)
        .is_err());
}

#[tokio::test]
async fn unknown_key_id_is_rejected() {
    let manager = manager(SignatureOptions::default());
    let (mut request, _body) = parse_request(HTTP_REQUEST);

    request.headers.insert(
        "signature".to_owned(),
        vec![r#"keyId="Nope",algorithm="hmac-sha256",headers="(request-target) host",signature="dGVzdA==""#.to_owned()],
    );

    let ctx = MessageContext::new(&request);
    let err = manager.verify_request(&ctx, None).await.unwrap_err();
    assert!(err.is_verification());
}

#[tokio::test]
async fn missing_required_header_is_rejected() {
    let manager = manager(full_header_options());
    let (mut request, body) = parse_request(HTTP_REQUEST);

    let key = manager
        .get_key("Test", SignatureScheme::HmacSha256)
        .await
        .unwrap();
    let digest_header = key.create_digest_header(&body);
    request
        .headers
        .entry("digest".to_owned())
        .or_default()
        .push(digest_header);

    // Sign only a subset of the configured headers.
    let mut minimal_options = httpsig::HeaderMap::new();
    minimal_options.insert("(request-target)".to_owned(), HeaderUsage::Both);
    let minimal_key = KeyManager::from_key(
        httpsig::SUPPORTED_VERSION,
        "Test",
        KeyConfig::Secret {
            mac_algorithm: MacAlgorithm::HmacSha256,
            key_material: b"a shared secret, known only to the two parties".to_vec(),
        },
        SignatureOptions {
            request_headers: minimal_options,
            response_headers: httpsig::HeaderMap::new(),
            calculate_digest: false,
        },
    )
    .unwrap()
    .get_key("Test", SignatureScheme::HmacSha256)
    .await
    .unwrap();

    let ctx = MessageContext::new(&request);
    let signature_header = minimal_key.sign_request(&ctx).unwrap();
    request
        .headers
        .entry("signature".to_owned())
        .or_default()
        .push(signature_header);

    let verify_ctx = MessageContext::new(&request);
    let err = manager
        .verify_request(&verify_ctx, None)
        .await
        .unwrap_err();
    assert!(err.is_verification());
}
