use mmswiglu_tiling::TilingPlan;
use tracing::trace;

use crate::element::Element;
use crate::engine::ElementwiseEngine;
use crate::error::{KernelError, Result};
use crate::queue::{Slot, SlotProducer};

/// SwiGLU over one band of a gate/up tile pair.
///
/// Owns the band-sized f32 scratch used for sigmoid intermediates; it is
/// allocated once and reused for every band.
#[derive(Debug)]
pub struct ActivationStage<'a, V> {
    engine: &'a V,
    alpha: f32,
    split_row_nums: usize,
    band_len: usize,
    tmp: Vec<f32>,
}

impl<'a, V> ActivationStage<'a, V> {
    pub fn new(engine: &'a V, plan: &TilingPlan) -> Self {
        ActivationStage {
            engine,
            alpha: plan.alpha,
            split_row_nums: plan.split_row_nums,
            band_len: plan.band_len(),
            tmp: vec![0.0; plan.band_len()],
        }
    }

    pub fn band_len(&self) -> usize {
        self.band_len
    }

    /// Compute band `band` of the tile pair into a fresh output slot and
    /// enqueue it for the output stage.
    pub fn compute<T>(
        &mut self,
        gate: &Slot<T>,
        up: &Slot<T>,
        band: usize,
        out_queue: &SlotProducer<T>,
    ) -> Result<()>
    where
        T: Element,
        V: ElementwiseEngine<T>,
    {
        if band >= self.split_row_nums {
            return Err(KernelError::Other(format!(
                "band {} out of range for {} bands per tile",
                band, self.split_row_nums
            )));
        }
        let tile_len = self.band_len * self.split_row_nums;
        for slot in [gate, up] {
            if slot.as_slice().len() != tile_len {
                return Err(KernelError::BufferMismatch {
                    stage: "activation",
                    expected: tile_len,
                    got: slot.as_slice().len(),
                });
            }
        }

        let range = band * self.band_len..(band + 1) * self.band_len;
        let mut out = out_queue.alloc()?;
        self.engine.swiglu(
            out.as_mut_slice(),
            &up.as_slice()[range.clone()],
            &gate.as_slice()[range],
            self.alpha,
            &mut self.tmp,
        )?;
        out_queue.enqueue(out)?;
        trace!(band, "band activated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuEngine;
    use crate::queue::slot_queue;
    use approx::assert_relative_eq;
    use mmswiglu_tiling::{DType, TraverseOrder};

    fn plan() -> TilingPlan {
        TilingPlan {
            used_core_num: 1,
            m: 4,
            k: 2,
            n: 2,
            single_core_m: 4,
            single_core_n: 2,
            single_core_k: 2,
            base_m: 4,
            base_n: 2,
            base_k: 2,
            step_m: 1,
            step_n: 1,
            step_ka: 1,
            step_kb: 1,
            traverse: TraverseOrder::FirstM,
            trans_a: false,
            trans_b: false,
            bias: false,
            split_row_nums: 2,
            dtype: DType::F32,
            alpha: 1.0,
        }
    }

    fn filled(values: &[f32]) -> (SlotProducer<f32>, Slot<f32>) {
        let (tx, rx) = slot_queue::<f32>("in", values.len());
        let mut slot = tx.alloc().unwrap();
        slot.as_mut_slice().copy_from_slice(values);
        tx.enqueue(slot).unwrap();
        (tx, rx.dequeue().unwrap())
    }

    #[test]
    fn test_compute_selects_band() {
        let p = plan();
        let engine = CpuEngine::new();
        let mut stage = ActivationStage::new(&engine, &p);
        assert_eq!(stage.band_len(), 4);

        let (_g, gate) = filled(&[0.0, 0.0, 0.0, 0.0, 1.0, -1.0, 30.0, -30.0]);
        let (_u, up) = filled(&[9.0, 9.0, 9.0, 9.0, 2.0, 2.0, 3.0, 3.0]);
        let (out_tx, out_rx) = slot_queue::<f32>("out", 4);

        stage.compute(&gate, &up, 0, &out_tx).unwrap();
        assert_eq!(out_rx.dequeue().unwrap().as_slice(), &[0.0; 4]);

        stage.compute(&gate, &up, 1, &out_tx).unwrap();
        let band = out_rx.dequeue().unwrap();
        assert_relative_eq!(band.as_slice()[0], 2.0 * 0.7310586, epsilon = 1e-5);
        assert_relative_eq!(band.as_slice()[1], 2.0 * -0.2689414, epsilon = 1e-5);
        assert_relative_eq!(band.as_slice()[2], 90.0, epsilon = 1e-4);
        assert_relative_eq!(band.as_slice()[3], 0.0, epsilon = 1e-4);
    }

    #[test]
    fn test_compute_rejects_bad_band() {
        let p = plan();
        let engine = CpuEngine::new();
        let mut stage = ActivationStage::new(&engine, &p);
        let (_g, gate) = filled(&[0.0; 8]);
        let (_u, up) = filled(&[0.0; 8]);
        let (out_tx, _out_rx) = slot_queue::<f32>("out", 4);
        assert!(stage.compute(&gate, &up, 2, &out_tx).is_err());

        let (_s, short) = filled(&[0.0; 4]);
        assert!(matches!(
            stage.compute(&gate, &short, 0, &out_tx),
            Err(KernelError::BufferMismatch { stage: "activation", .. })
        ));
    }
}
