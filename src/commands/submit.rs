use std::fs;
use std::io::{self, Read};
use std::path::Path;

use anyhow::{Result, bail};

use crate::cli::SubmitArgs;
use crate::commands::open_store;
use crate::config::AppConfig;
use crate::error::{RatingError, RatingResult};
use crate::submission::{RatingSubmission, SubmissionResponse, submit};

pub fn run(config: &AppConfig, args: SubmitArgs) -> Result<()> {
    let mut store = open_store(config)?;

    let response = match build_submission(&args) {
        Ok(submission) => submit(&mut store, &submission),
        Err(err) => SubmissionResponse::from_error(&err),
    };

    println!("{}", serde_json::to_string(&response)?);
    if !response.is_success() {
        bail!("rating submission rejected");
    }
    Ok(())
}

fn build_submission(args: &SubmitArgs) -> RatingResult<RatingSubmission> {
    if let Some(request_path) = &args.request {
        return RatingSubmission::parse(&read_request(request_path)?);
    }

    let (
        Some(image_id),
        Some(rater_id),
        Some(image_quality),
        Some(text_quality),
        Some(consistency),
    ) = (
        args.image_id.clone(),
        args.rater_id.clone(),
        args.image_quality,
        args.text_quality,
        args.consistency,
    )
    else {
        return Err(RatingError::validation(
            "image id, rater id and all three scores are required",
        ));
    };

    Ok(RatingSubmission {
        image_id,
        rater_id,
        image_quality,
        text_quality,
        consistency,
    })
}

fn read_request(path: &Path) -> RatingResult<Vec<u8>> {
    if path == Path::new("-") {
        let mut raw = Vec::new();
        io::stdin()
            .read_to_end(&mut raw)
            .map_err(|err| RatingError::io(path, err))?;
        return Ok(raw);
    }
    fs::read(path).map_err(|err| RatingError::io(path, err))
}
