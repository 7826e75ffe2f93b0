//! CSV export of the discovered request points

use crate::error::{Error, Result};
use crate::request::FuzzableRequest;
use csv::Writer;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// CSV header record
const HEADER: [&str; 3] = ["HTTP-METHOD", "URI", "POSTDATA"];

/// Write one `method,uri,postdata` record per request
pub fn export_fuzzable_requests(path: &Path, requests: &[FuzzableRequest]) -> Result<()> {
    let mut writer = Writer::from_path(path).map_err(Error::ExportFailed)?;
    write_requests(&mut writer, requests).map_err(Error::ExportFailed)?;
    info!(
        "Exported {} fuzzable requests to {}",
        requests.len(),
        path.display()
    );
    Ok(())
}

fn write_requests<W: Write>(writer: &mut Writer<W>, requests: &[FuzzableRequest]) -> csv::Result<()> {
    writer.write_record(HEADER)?;
    for request in requests {
        writer.write_record([
            request.method(),
            request.url().as_str(),
            request.post_data().as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::url;

    fn to_csv(requests: &[FuzzableRequest]) -> String {
        let mut writer = Writer::from_writer(vec![]);
        write_requests(&mut writer, requests).unwrap();
        String::from_utf8(writer.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn writes_header_and_rows() {
        let requests = vec![
            FuzzableRequest::get(url("http://a.com/?id=1")),
            FuzzableRequest::post(
                url("http://a.com/login"),
                vec![("user".into(), "a".into()), ("pass".into(), "b,c".into())],
            ),
        ];
        assert_eq!(
            to_csv(&requests),
            "HTTP-METHOD,URI,POSTDATA\n\
             GET,http://a.com/?id=1,\n\
             POST,http://a.com/login,user=a&pass=b%2Cc\n"
        );
    }

    #[test]
    fn fields_with_separators_are_quoted() {
        let requests = vec![FuzzableRequest::get(url("http://a.com/a,b"))];
        assert!(to_csv(&requests).ends_with("GET,\"http://a.com/a,b\",\n"));
    }

    #[test]
    fn export_writes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requests.csv");
        export_fuzzable_requests(&path, &[FuzzableRequest::get(url("http://a.com/"))]).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("HTTP-METHOD,URI,POSTDATA\nGET,http://a.com/,"));
    }

    #[test]
    fn export_to_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("requests.csv");
        assert!(matches!(
            export_fuzzable_requests(&path, &[]),
            Err(Error::ExportFailed(_))
        ));
    }
}
