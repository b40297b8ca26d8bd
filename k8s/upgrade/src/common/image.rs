use crate::error::Error;

/// The image url without its tag. If a prefix is given, it replaces the registry and
/// repository path of the image, keeping only the image name.
/// Eg: `quay.io/openebs/cstor-pool:1.12.0` with `registry.io/mirror/` gives
/// `registry.io/mirror/cstor-pool`.
pub fn image_url(url: &str, prefix: &str) -> Result<String, Error> {
    let name_start = url.rfind('/').map(|i| i + 1).unwrap_or_default();
    let base_image = match url.rfind(':') {
        Some(index) if index >= name_start => &url[.. index],
        _ => {
            return Err(Error::InvalidImage {
                image: url.to_string(),
            })
        }
    };
    if prefix.is_empty() {
        return Ok(base_image.to_string());
    }
    let name = base_image.rsplit('/').next().unwrap_or(base_image);
    Ok(format!("{prefix}{name}"))
}

/// Remove the suffix from the end of the image, only for images of the openebs registry.
pub fn remove_suffix_from_end(url: &str, suffix: &str) -> String {
    let segments = url.split('/').collect::<Vec<_>>();
    let from_openebs = segments.len() >= 2 && segments[segments.len() - 2] == "openebs";
    match url.strip_suffix(suffix) {
        Some(stripped) if from_openebs => stripped.to_string(),
        _ => url.to_string(),
    }
}

/// The new image for a container: the base image (optionally re-prefixed and stripped of the
/// given suffix) with the target tag.
pub(crate) fn target_image(
    image: &str,
    prefix: &str,
    tag: &str,
    strip_suffix: Option<&str>,
) -> Result<String, Error> {
    let mut base = image_url(image, prefix)?;
    if let Some(suffix) = strip_suffix {
        base = remove_suffix_from_end(&base, suffix);
    }
    Ok(format!("{base}:{tag}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_without_tag() {
        assert_eq!(
            image_url("quay.io/openebs/cstor-pool:1.12.0", "").unwrap(),
            "quay.io/openebs/cstor-pool"
        );
        assert_eq!(
            image_url("abc/quay.io/openebs/jiva:2.0.0", "xyz/aws-56546546/openebsdirectory/")
                .unwrap(),
            "xyz/aws-56546546/openebsdirectory/jiva"
        );
        assert!(image_url("openebs/jiva", "").is_err());
        assert!(image_url("localhost:5000/openebs/jiva", "").is_err());
        assert_eq!(
            image_url("localhost:5000/openebs/jiva:1.0", "").unwrap(),
            "localhost:5000/openebs/jiva"
        );
    }

    #[test]
    fn suffix_removal() {
        assert_eq!(
            remove_suffix_from_end("quay.io/openebs/cstor-pool-amd64", "-amd64"),
            "quay.io/openebs/cstor-pool"
        );
        assert_eq!(
            remove_suffix_from_end("quay.io/other/cstor-pool-amd64", "-amd64"),
            "quay.io/other/cstor-pool-amd64"
        );
        assert_eq!(
            remove_suffix_from_end("openebs/m-amd64-exporter", "-amd64"),
            "openebs/m-amd64-exporter"
        );
        assert_eq!(remove_suffix_from_end("cstor-pool-amd64", "-amd64"), "cstor-pool-amd64");
    }

    #[test]
    fn new_image() {
        assert_eq!(
            target_image("openebs/cstor-pool-mgmt-amd64:1.12.0", "", "2.0.0", Some("-amd64"))
                .unwrap(),
            "openebs/cstor-pool-mgmt:2.0.0"
        );
        assert_eq!(
            target_image("openebs/jiva:1.12.0", "", "2.0.0-ee", None).unwrap(),
            "openebs/jiva:2.0.0-ee"
        );
    }
}
