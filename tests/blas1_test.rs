use approx::assert_relative_eq;
use queued_blas::{
    asum_host, axpy, copy, copy_tiled, dot_host, iamax_host, iamin_host, nrm2_host, rot, rotg,
    scal, swap, DeviceBuffer, Executor,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn random_vec(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

#[test]
fn copy_round_trip_is_idempotent() {
    let ex = Executor::new();
    for (n, inc) in [(1usize, 1isize), (7, 1), (64, 2), (33, 3)] {
        let span = (n.max(1) - 1) * inc as usize + 1;
        let x_host = random_vec(span, 11 + n as u64);
        let x = DeviceBuffer::from_slice(&x_host);
        let y = DeviceBuffer::from_elem(0.0, span);
        let x2 = DeviceBuffer::from_elem(0.0, span);

        copy(&ex, n, &x, inc, &y, inc).unwrap();
        copy(&ex, n, &y, inc, &x2, inc).unwrap().wait().unwrap();

        let got = ex.copy_to_host(&x2).unwrap();
        for i in 0..n {
            let idx = i * inc as usize;
            assert_eq!(got[idx], x_host[idx], "n={n} inc={inc} i={i}");
        }
    }
}

#[test]
fn copy_with_negative_increment_reverses() {
    let ex = Executor::new();
    let x = DeviceBuffer::from_slice(&[1.0, 2.0, 3.0, 4.0]);
    let y = DeviceBuffer::from_elem(0.0, 4);
    // BLAS convention: inc -1 starts from the last element
    copy(&ex, 4, &x, -1, &y, 1).unwrap().wait().unwrap();
    assert_eq!(ex.copy_to_host(&y).unwrap(), vec![4.0, 3.0, 2.0, 1.0]);
}

#[test]
fn axpy_accumulates_in_place() {
    let ex = Executor::new();
    let x_host = random_vec(100, 3);
    let y_host = random_vec(100, 4);
    let x = DeviceBuffer::from_slice(&x_host);
    let y = DeviceBuffer::from_slice(&y_host);

    axpy(&ex, 100, 2.5, &x, 1, &y, 1).unwrap().wait().unwrap();

    let got = ex.copy_to_host(&y).unwrap();
    for i in 0..100 {
        assert_relative_eq!(got[i], 2.5 * x_host[i] + y_host[i], epsilon = 1e-12);
    }
}

#[test]
fn scal_scales_strided_elements_only() {
    let ex = Executor::new();
    let x = DeviceBuffer::from_slice(&[1.0, 10.0, 2.0, 20.0, 3.0, 30.0]);
    scal(&ex, 3, -2.0, &x, 2).unwrap().wait().unwrap();
    assert_eq!(
        ex.copy_to_host(&x).unwrap(),
        vec![-2.0, 10.0, -4.0, 20.0, -6.0, 30.0]
    );
}

#[test]
fn dot_is_commutative() {
    let ex = Executor::new();
    let x_host = random_vec(1000, 5);
    let y_host = random_vec(1000, 6);
    let x = DeviceBuffer::from_slice(&x_host);
    let y = DeviceBuffer::from_slice(&y_host);

    let xy = dot_host(&ex, 1000, &x, 1, &y, 1).unwrap();
    let yx = dot_host(&ex, 1000, &y, 1, &x, 1).unwrap();
    let reference: f64 = x_host.iter().zip(&y_host).map(|(a, b)| a * b).sum();

    assert_relative_eq!(xy, yx, epsilon = 1e-12);
    assert_relative_eq!(xy, reference, epsilon = 1e-9);
}

#[test]
fn nrm2_squares_to_dot() {
    let ex = Executor::with_work_group_size(8).unwrap();
    let x_host = random_vec(513, 7);
    let x = DeviceBuffer::from_slice(&x_host);

    let norm = nrm2_host(&ex, 513, &x, 1).unwrap();
    let self_dot = dot_host(&ex, 513, &x, 1, &x, 1).unwrap();

    assert!(norm > 0.0);
    assert_relative_eq!(norm * norm, self_dot, epsilon = 1e-9);
}

#[test]
fn asum_and_nrm2_are_nonnegative_and_zero_only_on_zero() {
    let ex = Executor::new();
    let x = DeviceBuffer::from_slice(&[-1.0, 2.0, -3.0]);
    assert_relative_eq!(asum_host(&ex, 3, &x, 1).unwrap(), 6.0, epsilon = 1e-12);

    let z = DeviceBuffer::from_elem(0.0, 17);
    assert_eq!(asum_host(&ex, 17, &z, 1).unwrap(), 0.0);
    assert_eq!(nrm2_host(&ex, 17, &z, 1).unwrap(), 0.0);

    let tiny = DeviceBuffer::from_slice(&[0.0, 0.0, 1e-8, 0.0]);
    assert!(asum_host(&ex, 4, &tiny, 1).unwrap() > 0.0);
    assert!(nrm2_host(&ex, 4, &tiny, 1).unwrap() > 0.0);
}

#[test]
fn iamax_and_iamin_return_first_tied_index() {
    // Work-group size 2 spreads the ties across partial groups.
    let ex = Executor::with_work_group_size(2).unwrap();
    let x = DeviceBuffer::from_slice(&[1.0, 5.0, -3.0, 5.0, -3.0, 5.0, 2.0, 0.0]);

    assert_eq!(iamax_host(&ex, 8, &x, 1).unwrap(), 1);
    assert_eq!(iamin_host(&ex, 8, &x, 1).unwrap(), 2);
}

#[test]
fn iamax_indices_are_logical_not_physical() {
    let ex = Executor::new();
    // inc 2 means logical index 3 sits at physical slot 6
    let x = DeviceBuffer::from_slice(&[0.0, 99.0, 1.0, 99.0, 2.0, 99.0, 7.0, 99.0]);
    assert_eq!(iamax_host(&ex, 4, &x, 2).unwrap(), 3);
}

#[test]
fn swap_is_an_involution() {
    let ex = Executor::new();
    let x_host = random_vec(64, 8);
    let y_host = random_vec(64, 9);
    let x = DeviceBuffer::from_slice(&x_host);
    let y = DeviceBuffer::from_slice(&y_host);

    swap(&ex, 64, &x, 1, &y, 1).unwrap();
    let mid_x = ex.copy_to_host(&x).unwrap();
    assert_eq!(mid_x, y_host);

    swap(&ex, 64, &x, 1, &y, 1).unwrap().wait().unwrap();
    assert_eq!(ex.copy_to_host(&x).unwrap(), x_host);
    assert_eq!(ex.copy_to_host(&y).unwrap(), y_host);
}

#[test]
fn copy_tiled_matches_plain_copy_when_tile_divides() {
    let ex = Executor::new();
    let x_host = random_vec(64, 10);
    let x = DeviceBuffer::from_slice(&x_host);
    let y = DeviceBuffer::from_elem(0.0, 64);

    copy_tiled(&ex, 64, &x, 1, &y, 1, 8).unwrap().wait().unwrap();
    assert_eq!(ex.copy_to_host(&y).unwrap(), x_host);
}

#[test]
fn copy_tiled_read_modify_preserves_strided_gaps() {
    let ex = Executor::new();
    let x = DeviceBuffer::from_slice(&[1.0, 2.0, 3.0, 4.0]);
    // destination gaps hold sentinels that the tiled path must not clobber
    let y = DeviceBuffer::from_elem(-9.0, 8);

    copy_tiled(&ex, 4, &x, 1, &y, 2, 2).unwrap().wait().unwrap();
    assert_eq!(
        ex.copy_to_host(&y).unwrap(),
        vec![1.0, -9.0, 2.0, -9.0, 3.0, -9.0, 4.0, -9.0]
    );
}

#[test]
fn copy_tiled_falls_back_when_tile_does_not_divide() {
    let ex = Executor::new();
    let x_host = random_vec(65, 12);
    let x = DeviceBuffer::from_slice(&x_host);
    let y = DeviceBuffer::from_elem(0.0, 65);
    let y_ref = DeviceBuffer::from_elem(0.0, 65);

    // 7 does not divide 65: defined degradation, identical result
    copy_tiled(&ex, 65, &x, 1, &y, 1, 7).unwrap().wait().unwrap();
    copy(&ex, 65, &x, 1, &y_ref, 1).unwrap().wait().unwrap();
    assert_eq!(
        ex.copy_to_host(&y).unwrap(),
        ex.copy_to_host(&y_ref).unwrap()
    );
}

#[test]
fn rot_applies_the_plane_rotation() {
    let ex = Executor::new();
    let x_host = random_vec(50, 13);
    let y_host = random_vec(50, 14);
    let x = DeviceBuffer::from_slice(&x_host);
    let y = DeviceBuffer::from_slice(&y_host);
    let (c, s) = (0.6, 0.8);

    rot(&ex, 50, &x, 1, &y, 1, c, s).unwrap().wait().unwrap();

    let got_x = ex.copy_to_host(&x).unwrap();
    let got_y = ex.copy_to_host(&y).unwrap();
    for i in 0..50 {
        assert_relative_eq!(got_x[i], c * x_host[i] + s * y_host[i], epsilon = 1e-12);
        assert_relative_eq!(got_y[i], -s * x_host[i] + c * y_host[i], epsilon = 1e-12);
    }
}

#[test]
fn rotg_constructs_the_classic_three_four_five_rotation() {
    let (mut a, mut b, mut c, mut s) = (3.0_f64, 4.0, 0.0, 0.0);
    rotg(&mut a, &mut b, &mut c, &mut s);
    assert_relative_eq!(a, 5.0, epsilon = 1e-12);
    assert_relative_eq!(c, 0.6, epsilon = 1e-12);
    assert_relative_eq!(s, 0.8, epsilon = 1e-12);
    // |a| < |b|: the reconstruction parameter is 1/c
    assert_relative_eq!(b, 1.0 / 0.6, epsilon = 1e-12);
}

#[test]
fn rotg_zero_scale_yields_identity_rotation() {
    let (mut a, mut b, mut c, mut s) = (0.0_f64, 0.0, 7.0, 7.0);
    rotg(&mut a, &mut b, &mut c, &mut s);
    assert_eq!(c, 1.0);
    assert_eq!(s, 0.0);
    assert_eq!(a, 0.0);
    assert_eq!(b, 0.0);
}

#[test]
fn rot_then_inverse_rot_restores_vectors() {
    let ex = Executor::new();
    let x_host = random_vec(32, 15);
    let y_host = random_vec(32, 16);
    let x = DeviceBuffer::from_slice(&x_host);
    let y = DeviceBuffer::from_slice(&y_host);
    let (c, s) = (0.28, 0.96);

    rot(&ex, 32, &x, 1, &y, 1, c, s).unwrap();
    rot(&ex, 32, &x, 1, &y, 1, c, -s).unwrap().wait().unwrap();

    let got_x = ex.copy_to_host(&x).unwrap();
    let got_y = ex.copy_to_host(&y).unwrap();
    for i in 0..32 {
        assert_relative_eq!(got_x[i], x_host[i], epsilon = 1e-12);
        assert_relative_eq!(got_y[i], y_host[i], epsilon = 1e-12);
    }
}

#[test]
fn zero_length_reductions_are_well_defined() {
    let ex = Executor::new();
    let x = DeviceBuffer::from_elem(3.0, 4);
    assert_eq!(dot_host(&ex, 0, &x, 1, &x, 1).unwrap(), 0.0);
    assert_eq!(asum_host(&ex, 0, &x, 1).unwrap(), 0.0);
    assert_eq!(nrm2_host(&ex, 0, &x, 1).unwrap(), 0.0);
    assert_eq!(iamax_host(&ex, 0, &x, 1).unwrap(), 0);
}
