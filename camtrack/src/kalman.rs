//! Linear Kalman filter used as the per-track motion model

use crate::bbox::Bbox;
use anyhow::Result;
use nalgebra::{DMatrix, DVector};

/// Full parameter set for a filter instance.
#[derive(Debug, Clone)]
pub struct KalmanFilterParams {
    pub dim_x: usize,    // state dimension
    pub dim_z: usize,    // observation dimension
    pub x: DVector<f32>, // initial state
    pub p: DMatrix<f32>, // initial state covariance
    pub f: DMatrix<f32>, // state transition matrix
    pub h: DMatrix<f32>, // observation matrix
    pub r: DMatrix<f32>, // observation noise covariance
    pub q: DMatrix<f32>, // process noise covariance
}

/// Linear Kalman filter over dynamically sized matrices.
#[derive(Debug, Clone)]
pub struct KalmanFilter {
    pub dim_x: usize,
    pub dim_z: usize,
    pub x: DVector<f32>,
    pub p: DMatrix<f32>,
    pub f: DMatrix<f32>,
    pub h: DMatrix<f32>,
    pub r: DMatrix<f32>,
    pub q: DMatrix<f32>,
}

impl KalmanFilter {
    pub fn new(params: KalmanFilterParams) -> Self {
        Self {
            dim_x: params.dim_x,
            dim_z: params.dim_z,
            x: params.x,
            p: params.p,
            f: params.f,
            h: params.h,
            r: params.r,
            q: params.q,
        }
    }

    /// Constant-velocity box motion model.
    ///
    /// State is [cx, cy, area, aspect, vx, vy, v_area]; the observation is
    /// the center-form box [cx, cy, area, aspect]. Aspect ratio carries no
    /// velocity term. `meas_var` and `proc_var` are the diagonals of the
    /// observation and process noise covariances.
    pub fn constant_velocity_box(bbox: &Bbox, meas_var: [f32; 4], proc_var: [f32; 7]) -> Self {
        let z = bbox.to_z();
        let initial_state = DVector::from_vec(vec![z[0], z[1], z[2], z[3], 0.0, 0.0, 0.0]);

        let params = KalmanFilterParams {
            dim_x: 7,
            dim_z: 4,
            x: initial_state,
            // Velocities start unobserved, hence the large tail variances.
            p: DMatrix::from_diagonal(&DVector::from_vec(vec![
                10.0, 10.0, 10.0, 10.0, 10000.0, 10000.0, 10000.0,
            ])),
            f: DMatrix::from_row_slice(
                7,
                7,
                &[
                    1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, // cx' = cx + vx
                    0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, // cy' = cy + vy
                    0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, // area' = area + v_area
                    0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, // aspect' = aspect
                    0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, // vx' = vx
                    0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, // vy' = vy
                    0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, // v_area' = v_area
                ],
            ),
            h: DMatrix::from_row_slice(
                4,
                7,
                &[
                    1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
                    1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0,
                ],
            ),
            r: DMatrix::from_diagonal(&DVector::from_vec(meas_var.to_vec())),
            q: DMatrix::from_diagonal(&DVector::from_vec(proc_var.to_vec())),
        };

        Self::new(params)
    }

    /// Advance the state one step: x = F x, P = F P Fᵀ + Q.
    pub fn predict(&mut self) {
        self.x = &self.f * &self.x;
        self.p = &self.f * &self.p * self.f.transpose() + &self.q;
    }

    /// Fold in an observation. Fails if the innovation covariance is
    /// singular, in which case the caller should discard the track.
    pub fn update(&mut self, z: DVector<f32>) -> Result<()> {
        // Residual: y = z - H x
        let y = z - &self.h * &self.x;

        // Innovation covariance: S = H P Hᵀ + R
        let s = &self.h * &self.p * self.h.transpose() + &self.r;

        // Kalman gain: K = P Hᵀ S⁻¹
        let s_inv = s
            .try_inverse()
            .ok_or_else(|| anyhow::anyhow!("singular innovation covariance"))?;
        let k = &self.p * self.h.transpose() * s_inv;

        self.x = &self.x + &k * y;

        let i = DMatrix::identity(self.dim_x, self.dim_x);
        self.p = (i - k * &self.h) * &self.p;

        Ok(())
    }

    /// Current state estimate as a corner-form box.
    pub fn state_bbox(&self) -> Bbox {
        Bbox::from_z(&[self.x[0], self.x[1], self.x[2], self.x[3]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_predict_update_1d() {
        // 1D position+velocity sanity check on the generic machinery.
        let params = KalmanFilterParams {
            dim_x: 2,
            dim_z: 1,
            x: DVector::from_vec(vec![0.0, 1.0]),
            p: DMatrix::from_diagonal(&DVector::from_vec(vec![1000.0, 1000.0])),
            f: DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 0.0, 1.0]),
            h: DMatrix::from_row_slice(1, 2, &[1.0, 0.0]),
            r: DMatrix::from_element(1, 1, 0.1),
            q: DMatrix::from_diagonal(&DVector::from_vec(vec![0.01, 0.01])),
        };

        let mut kf = KalmanFilter::new(params);
        kf.predict();
        assert_abs_diff_eq!(kf.x[0], 1.0, epsilon = 0.001);

        kf.update(DVector::from_vec(vec![0.9])).unwrap();
        assert!(kf.x[0] > 0.8 && kf.x[0] < 1.0);
    }

    #[test]
    fn test_box_model_follows_motion() {
        let start = Bbox::new(0.0, 0.0, 10.0, 20.0);
        let mut kf = KalmanFilter::constant_velocity_box(
            &start,
            [1.0, 1.0, 10.0, 10.0],
            [1.0, 1.0, 1.0, 1.0, 0.01, 0.01, 0.0001],
        );

        // Feed a box moving right by 2px per step.
        for step in 1..=5 {
            kf.predict();
            let shifted = Bbox::new(
                2.0 * step as f32,
                0.0,
                10.0 + 2.0 * step as f32,
                20.0,
            );
            let z = shifted.to_z();
            kf.update(DVector::from_vec(z.to_vec())).unwrap();
        }

        kf.predict();
        let predicted = kf.state_bbox();
        // Having observed steady rightward motion, the prediction should be
        // ahead of the last observation's center (x = 15).
        assert!(predicted.center_x() > 15.0);
        assert_abs_diff_eq!(predicted.center_y(), 10.0, epsilon = 1.0);
    }
}
