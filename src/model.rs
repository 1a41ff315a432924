use ndarray::Array4;
use std::path::Path;
use tract_onnx::prelude::*;

use crate::error::{Error, Result};

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Anything that maps a normalized image tensor to one score per class.
pub trait InferenceModel: Send + Sync {
    fn run(&self, input: Array4<f32>) -> Result<Vec<f32>>;
}

pub struct OnnxModel {
    plan: OnnxPlan,
}

impl OnnxModel {
    pub fn load<P: AsRef<Path>>(path: P, size: u32) -> Result<Self> {
        let size = size as usize;
        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|model| {
                model.with_input_fact(
                    0,
                    InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
                )
            })
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(model_error)?;

        Ok(Self { plan })
    }
}

impl InferenceModel for OnnxModel {
    fn run(&self, input: Array4<f32>) -> Result<Vec<f32>> {
        let shape = input.shape().to_vec();
        let data = input.into_raw_vec();
        let tensor = Tensor::from_shape(&shape, &data).map_err(model_error)?;

        let outputs = self.plan.run(tvec!(tensor.into())).map_err(model_error)?;
        let output = outputs
            .first()
            .ok_or_else(|| Error::Model("model returned no outputs".to_string()))?;

        let scores = output.to_array_view::<f32>().map_err(model_error)?;
        Ok(scores.iter().copied().collect())
    }
}

fn model_error(error: TractError) -> Error {
    Error::Model(format!("{:#}", error))
}
